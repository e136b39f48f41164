//! JSON-lines command contract for the binary.
//!
//! One `Command` per input line, tagged by `"op"`. Each command yields one
//! `Outcome` (tagged by `"result"`) or an error.

use std::io::{self, BufRead, Write};

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::types::*;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
  AddIncident(NewIncident),
  UpdateIncident {
    incident_id: IncidentId,
    #[serde(flatten)]
    update: IncidentUpdate,
  },
  AddResource(NewResource),
  UpdateResourceStatus {
    resource_id: ResourceId,
    status: ResourceStatus,
  },
  Allocate {
    incident_id: IncidentId,
    resource_id: ResourceId,
  },
  Reallocate {
    incident_id: IncidentId,
    resource_id: ResourceId,
  },
  Process,
  Report,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
  IncidentAdded { incident_id: IncidentId },
  IncidentUpdated { incident_id: IncidentId },
  ResourceAdded { resource_id: ResourceId },
  ResourceStatusChanged { resource_id: ResourceId, status: ResourceStatus },
  Allocated { ok: bool },
  Reallocated { ok: bool },
  Processed(AllocationOutcome),
  Report { incidents: Vec<IncidentReport> },
}

impl Command {
  /// Run against `engine`.
  ///
  /// Updates aimed at an unknown id come back as `NotFound`; a refused manual
  /// allocation is a normal `ok: false` outcome.
  pub fn apply(self, engine: &mut Engine) -> Result<Outcome, EngineError> {
    match self {
      Command::AddIncident(new) => {
        let incident_id = engine.add_incident(new)?;
        Ok(Outcome::IncidentAdded { incident_id })
      }
      Command::UpdateIncident {
        incident_id,
        update,
      } => {
        if !engine.update_incident(incident_id, update)? {
          return Err(EngineError::not_found("incident", incident_id));
        }
        Ok(Outcome::IncidentUpdated { incident_id })
      }
      Command::AddResource(new) => {
        let resource_id = engine.add_resource(new)?;
        Ok(Outcome::ResourceAdded { resource_id })
      }
      Command::UpdateResourceStatus {
        resource_id,
        status,
      } => {
        if !engine.update_resource_status(resource_id, status)? {
          return Err(EngineError::not_found("resource", resource_id));
        }
        Ok(Outcome::ResourceStatusChanged {
          resource_id,
          status,
        })
      }
      Command::Allocate {
        incident_id,
        resource_id,
      } => Ok(Outcome::Allocated {
        ok: engine.allocate_resource(incident_id, resource_id),
      }),
      Command::Reallocate {
        incident_id,
        resource_id,
      } => Ok(Outcome::Reallocated {
        ok: engine.reallocate_resource(incident_id, resource_id),
      }),
      Command::Process => Ok(Outcome::Processed(engine.process_allocation())),
      Command::Report => Ok(Outcome::Report {
        incidents: engine.report(),
      }),
    }
  }
}

/// Apply every command line in `input`, writing one JSON line per command to
/// `output`.
///
/// Blank lines are skipped. Lines that are not UTF-8 or not a valid command get
/// an `ErrorOutput` line and the stream goes on. Only an I/O error on either
/// side ends the session early; whatever was applied before it stays applied.
pub fn run_stream<R: BufRead, W: Write>(
  engine: &mut Engine,
  mut input: R,
  output: &mut W,
) -> io::Result<()> {
  let mut buf = Vec::new();
  loop {
    buf.clear();
    if input.read_until(b'\n', &mut buf)? == 0 {
      return Ok(());
    }

    let line = match std::str::from_utf8(&buf) {
      Ok(line) => line,
      Err(e) => {
        tracing::warn!(error = %e, "skipping non-utf-8 line");
        serde_json::to_writer(&mut *output, &ErrorOutput::new("invalid utf-8"))?;
        writeln!(output)?;
        continue;
      }
    };

    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }

    let command: Command = match serde_json::from_str(trimmed) {
      Ok(c) => c,
      Err(e) => {
        let err = ErrorOutput::new(format!("json parse: {}", e));
        serde_json::to_writer(&mut *output, &err)?;
        writeln!(output)?;
        continue;
      }
    };

    match command.apply(engine) {
      Ok(outcome) => serde_json::to_writer(&mut *output, &outcome)?,
      Err(e) => {
        tracing::warn!(error = %e, "command rejected");
        serde_json::to_writer(&mut *output, &ErrorOutput::from(&e))?;
      }
    }
    writeln!(output)?;
  }
}

#[cfg(test)]
mod tests {
  use std::io::{BufReader, Cursor, Read};

  use super::*;

  fn parse(line: &str) -> Command {
    serde_json::from_str(line).unwrap()
  }

  #[test]
  fn add_incident_parses_case_insensitive_priority() {
    let cmd = parse(
      r#"{"op":"add_incident","location":"Zone 1","emergency_type":"Fire",
          "priority":"high","required_resource_types":["Fire Truck"]}"#,
    );
    assert_eq!(
      cmd,
      Command::AddIncident(NewIncident {
        location: "Zone 1".into(),
        emergency_type: "Fire".into(),
        priority: Priority::High,
        required_resource_types: vec!["Fire Truck".into()],
      })
    );
  }

  #[test]
  fn unknown_priority_fails_to_parse() {
    let err = serde_json::from_str::<Command>(
      r#"{"op":"add_incident","location":"Zone 1","emergency_type":"Fire","priority":"urgent"}"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("urgent"));
  }

  #[test]
  fn update_incident_flattens_fields() {
    let id = IncidentId::new();
    let cmd = parse(&format!(
      r#"{{"op":"update_incident","incident_id":"{id}","status":"in progress"}}"#
    ));
    assert_eq!(
      cmd,
      Command::UpdateIncident {
        incident_id: id,
        update: IncidentUpdate::status(IncidentStatus::InProgress),
      }
    );
  }

  #[test]
  fn commands_drive_the_engine() {
    let mut engine = Engine::new();
    let resource_id = match parse(
      r#"{"op":"add_resource","name":"Medic 7","resource_type":"Ambulance","location":"Zone 3"}"#,
    )
    .apply(&mut engine)
    .unwrap()
    {
      Outcome::ResourceAdded { resource_id } => resource_id,
      other => panic!("unexpected outcome: {:?}", other),
    };
    let incident_id = match parse(
      r#"{"op":"add_incident","location":"Zone 3","emergency_type":"Collapse",
          "priority":"MEDIUM","required_resource_types":["Ambulance"]}"#,
    )
    .apply(&mut engine)
    .unwrap()
    {
      Outcome::IncidentAdded { incident_id } => incident_id,
      other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(
      engine.resource(resource_id).unwrap().assigned_incident_id,
      Some(incident_id)
    );

    let outcome = Command::Allocate {
      incident_id,
      resource_id,
    }
    .apply(&mut engine)
    .unwrap();
    assert_eq!(outcome, Outcome::Allocated { ok: false });

    match Command::Report.apply(&mut engine).unwrap() {
      Outcome::Report { incidents } => {
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].assigned_resource_ids, vec![resource_id]);
      }
      other => panic!("unexpected outcome: {:?}", other),
    }
  }

  #[test]
  fn update_of_unknown_incident_is_not_found() {
    let mut engine = Engine::new();
    let err = Command::UpdateIncident {
      incident_id: IncidentId::new(),
      update: IncidentUpdate::status(IncidentStatus::Closed),
    }
    .apply(&mut engine)
    .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { kind: "incident", .. }));
  }

  #[test]
  fn outcome_is_tagged_by_result() {
    let json = serde_json::to_string(&Outcome::Allocated { ok: true }).unwrap();
    assert_eq!(json, r#"{"result":"allocated","ok":true}"#);

    let json = serde_json::to_value(&Outcome::Processed(AllocationOutcome::default())).unwrap();
    assert_eq!(json["result"], "processed");
    assert_eq!(json["unfulfilled"], 0);
  }

  fn output_lines(out: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(out)
      .lines()
      .map(|l| serde_json::from_str(l).unwrap())
      .collect()
  }

  #[test]
  fn stream_survives_non_utf8_line() {
    let mut input = Vec::new();
    input.extend_from_slice(
      br#"{"op":"add_resource","name":"Medic 7","resource_type":"Ambulance","location":"Zone 1"}"#,
    );
    input.extend_from_slice(b"\n\xff\xfe\n\n");
    input.extend_from_slice(br#"{"op":"process"}"#);

    let mut engine = Engine::new();
    let mut out = Vec::new();
    run_stream(&mut engine, Cursor::new(input), &mut out).unwrap();

    let lines = output_lines(&out);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["result"], "resource_added");
    assert_eq!(lines[1]["error"], true);
    assert_eq!(lines[1]["message"], "invalid utf-8");
    assert_eq!(lines[2]["result"], "processed");
    assert_eq!(engine.resources().len(), 1);
  }

  #[test]
  fn stream_reports_bad_json_and_rejected_commands() {
    let input = concat!(
      "{not json\n",
      r#"{"op":"add_resource","name":"","resource_type":"Ambulance","location":"Zone 1"}"#,
      "\n"
    );
    let mut engine = Engine::new();
    let mut out = Vec::new();
    run_stream(&mut engine, Cursor::new(input), &mut out).unwrap();

    let lines = output_lines(&out);
    assert!(lines[0]["message"].as_str().unwrap().starts_with("json parse"));
    assert_eq!(lines[1]["field"], "name");
    assert!(engine.resources().is_empty());
  }

  struct BrokenPipe;

  impl Read for BrokenPipe {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
      Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin went away"))
    }
  }

  #[test]
  fn read_error_ends_stream_but_keeps_applied_commands() {
    let first = Cursor::new(
      &b"{\"op\":\"add_resource\",\"name\":\"Medic 7\",\"resource_type\":\"Ambulance\",\"location\":\"Zone 1\"}\n"[..],
    );
    let input = BufReader::new(first.chain(BrokenPipe));

    let mut engine = Engine::new();
    let mut out = Vec::new();
    let err = run_stream(&mut engine, input, &mut out).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    assert_eq!(engine.resources().len(), 1);
    assert_eq!(output_lines(&out).len(), 1);
  }
}
