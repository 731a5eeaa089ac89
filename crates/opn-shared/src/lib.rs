use chrono::{
  DateTime,
  Utc
};
use serde::{
  Deserialize,
  Serialize
};

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(
  try_from = "StatusRepr",
  into = "u8"
)]
pub enum TaskStatus {
  Pending,
  Completed,
  Cancelled
}

impl TaskStatus {
  pub fn code(self) -> u8 {
    match self {
      | TaskStatus::Pending => 0,
      | TaskStatus::Completed => 1,
      | TaskStatus::Cancelled => 2
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      | TaskStatus::Pending => "pending",
      | TaskStatus::Completed => {
        "completed"
      }
      | TaskStatus::Cancelled => {
        "cancelled"
      }
    }
  }
}

impl From<TaskStatus> for u8 {
  fn from(status: TaskStatus) -> Self {
    status.code()
  }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatusRepr {
  Code(u8),
  Name(String)
}

impl TryFrom<StatusRepr> for TaskStatus {
  type Error = String;

  fn try_from(
    repr: StatusRepr
  ) -> Result<Self, Self::Error> {
    match repr {
      | StatusRepr::Code(0) => {
        Ok(TaskStatus::Pending)
      }
      | StatusRepr::Code(1) => {
        Ok(TaskStatus::Completed)
      }
      | StatusRepr::Code(2) => {
        Ok(TaskStatus::Cancelled)
      }
      | StatusRepr::Code(other) => Err(
        format!(
          "unknown task status code: \
           {other}"
        )
      ),
      | StatusRepr::Name(name) => {
        match name
          .trim()
          .to_ascii_lowercase()
          .as_str()
        {
          | "pending" => {
            Ok(TaskStatus::Pending)
          }
          | "completed" => {
            Ok(TaskStatus::Completed)
          }
          | "cancelled" | "canceled" => {
            Ok(TaskStatus::Cancelled)
          }
          | _ => Err(format!(
            "unknown task status: \
             {name}"
          ))
        }
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct Product {
  pub id:             u64,
  pub name:           String,
  #[serde(default)]
  pub initial_amount: u32,
  #[serde(default)]
  pub current_amount: u32
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct Institution {
  pub id:   u64,
  pub name: String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub id:              u64,
  #[serde(default)]
  pub user_id:         Option<String>,
  pub amount:          u32,
  pub status:          TaskStatus,
  #[serde(with = "wire_time")]
  pub creation_time:   DateTime<Utc>,
  #[serde(
    default,
    with = "wire_time::option"
  )]
  pub conclusion_time:
    Option<DateTime<Utc>>,
  #[serde(
    default,
    with = "wire_time::option"
  )]
  pub cancel_time:
    Option<DateTime<Utc>>,
  #[serde(default)]
  pub product_id:      Option<u64>,
  pub product:         Product,
  #[serde(default)]
  pub institution_id:  Option<u64>,
  pub institution:     Institution
}

impl Task {
  pub fn is_pending(&self) -> bool {
    self.status == TaskStatus::Pending
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
  pub name:            String,
  pub completed_tasks: u32
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
  pub idn:       String,
  pub user_name: String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct LoginResponse {
  #[serde(default)]
  pub name:  String,
  #[serde(default)]
  pub idn:   String,
  #[serde(default)]
  pub task:  Option<Task>,
  #[serde(default)]
  pub token: Option<String>
}

/// Timestamps as the task API emits them: ISO-8601, with or without an
/// offset. Values without an offset are taken as UTC.
pub mod wire_time {
  use chrono::{
    DateTime,
    NaiveDateTime,
    SecondsFormat,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn parse(
    raw: &str
  ) -> Result<DateTime<Utc>, String> {
    let trimmed = raw.trim();
    if let Ok(dt) =
      DateTime::parse_from_rfc3339(
        trimmed
      )
    {
      return Ok(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(
      trimmed,
      "%Y-%m-%dT%H:%M:%S%.f"
    )
    .map(|ndt| ndt.and_utc())
    .map_err(|err| {
      format!(
        "invalid timestamp {trimmed:?}: \
         {err}"
      )
    })
  }

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt.to_rfc3339_opts(
        SecondsFormat::Millis,
        true
      )
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw =
      String::deserialize(deserializer)?;
    parse(&raw)
      .map_err(serde::de::Error::custom)
  }

  pub mod option {
    use chrono::{
      DateTime,
      Utc
    };
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      dt: &Option<DateTime<Utc>>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => {
          super::serialize(
            value, serializer
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<Option<DateTime<Utc>>, D::Error>
    where
      D: Deserializer<'de>
    {
      let raw = Option::<String>::deserialize(
        deserializer
      )?;
      match raw {
        | Some(value)
          if !value.trim().is_empty() =>
        {
          super::parse(&value)
            .map(Some)
            .map_err(
              serde::de::Error::custom
            )
        }
        | _ => Ok(None)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE_TASK: &str = r#"{
    "id": 42,
    "userId": "123",
    "amount": 6,
    "status": 0,
    "creationTime": "2024-12-01T10:15:30.123",
    "conclusionTime": null,
    "cancelTime": null,
    "productId": 3,
    "product": { "id": 3, "name": "Arroz 5kg", "initialAmount": 200, "currentAmount": 140 },
    "institutionId": 9,
    "institution": { "id": 9, "name": "Lar São Vicente" }
  }"#;

  #[test]
  fn decodes_task_from_api_payload() {
    let task: Task =
      serde_json::from_str(SAMPLE_TASK)
        .expect("decode task");
    assert_eq!(task.id, 42);
    assert_eq!(
      task.status,
      TaskStatus::Pending
    );
    assert_eq!(
      task.product.name,
      "Arroz 5kg"
    );
    assert_eq!(
      task.institution.name,
      "Lar São Vicente"
    );
    assert!(task.conclusion_time.is_none());
    assert_eq!(
      task
        .creation_time
        .format("%Y-%m-%d %H:%M")
        .to_string(),
      "2024-12-01 10:15"
    );
  }

  #[test]
  fn status_accepts_names_and_rejects_unknown_codes() {
    let named: TaskStatus =
      serde_json::from_str("\"Cancelled\"")
        .expect("named status");
    assert_eq!(
      named,
      TaskStatus::Cancelled
    );
    assert!(
      serde_json::from_str::<TaskStatus>(
        "7"
      )
      .is_err()
    );
    assert_eq!(
      serde_json::to_string(
        &TaskStatus::Completed
      )
      .expect("encode status"),
      "1"
    );
  }

  #[test]
  fn offset_timestamps_are_normalized_to_utc() {
    let parsed = wire_time::parse(
      "2024-12-01T10:00:00-03:00"
    )
    .expect("parse offset timestamp");
    assert_eq!(
      parsed
        .format("%H:%M")
        .to_string(),
      "13:00"
    );
  }

  #[test]
  fn ranking_entry_uses_camel_case() {
    let entry: RankingEntry =
      serde_json::from_str(
        r#"{"name":"Ana","completedTasks":4}"#
      )
      .expect("decode ranking");
    assert_eq!(entry.completed_tasks, 4);
  }

  #[test]
  fn login_response_tolerates_missing_name() {
    let response: LoginResponse =
      serde_json::from_str(
        r#"{"idn":"123","task":null}"#
      )
      .expect("decode login response");
    assert_eq!(response.name, "");
    assert_eq!(response.idn, "123");
    assert!(response.task.is_none());
    assert!(response.token.is_none());
  }
}
