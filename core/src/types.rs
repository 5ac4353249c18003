//! Typed views over the records screens read most.
//!
//! # Design
//! Each struct names only the identity fields and the handful of fields the
//! screens actually use. Everything else the server sends is kept in `extra`
//! and serialized back unchanged, so a server schema change never breaks
//! decoding. Schemas vary by origin service, so every named field is optional.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::resource::{identity_of, value_number, value_text, Record};

fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_number))
}

fn extra_text(extra: &Map<String, Value>, field: &str) -> Option<String> {
    extra.get(field).and_then(value_text)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub mongo_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for Event {
    fn resource_id(&self) -> Option<String> {
        identity_of(self.id.as_ref(), self.mongo_id.as_ref())
    }

    fn text(&self, field: &str) -> Option<String> {
        match field {
            "title" => self.title.clone(),
            "date" => self.date.clone(),
            "location" => self.location.clone(),
            _ => extra_text(&self.extra, field),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sermon {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub mongo_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preacher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for Sermon {
    fn resource_id(&self) -> Option<String> {
        identity_of(self.id.as_ref(), self.mongo_id.as_ref())
    }

    fn text(&self, field: &str) -> Option<String> {
        match field {
            "title" => self.title.clone(),
            "preacher" => self.preacher.clone(),
            "date" => self.date.clone(),
            _ => extra_text(&self.extra, field),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub mongo_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Servers send this as a number or a numeric string.
    #[serde(
        default,
        deserialize_with = "lenient_amount",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for Donation {
    fn resource_id(&self) -> Option<String> {
        identity_of(self.id.as_ref(), self.mongo_id.as_ref())
    }

    fn text(&self, field: &str) -> Option<String> {
        match field {
            "donorName" => self.donor_name.clone(),
            "email" => self.email.clone(),
            "amount" => self.amount.map(|amount| amount.to_string()),
            "reference" => self.reference.clone(),
            "status" => self.status.clone(),
            "date" => self.date.clone(),
            _ => extra_text(&self.extra, field),
        }
    }

    fn number(&self, field: &str) -> Option<f64> {
        match field {
            "amount" => self.amount,
            _ => self.extra.get(field).and_then(value_number),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub mongo_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for Prayer {
    fn resource_id(&self) -> Option<String> {
        identity_of(self.id.as_ref(), self.mongo_id.as_ref())
    }

    fn text(&self, field: &str) -> Option<String> {
        match field {
            "name" => self.name.clone(),
            "request" => self.request.clone(),
            "status" => self.status.clone(),
            "createdAt" => self.created_at.clone(),
            _ => extra_text(&self.extra, field),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstTimer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub mongo_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Follow-up state, e.g. `pending`, `contacted`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for FirstTimer {
    fn resource_id(&self) -> Option<String> {
        identity_of(self.id.as_ref(), self.mongo_id.as_ref())
    }

    fn text(&self, field: &str) -> Option<String> {
        match field {
            "fullName" => self.full_name.clone(),
            "email" => self.email.clone(),
            "phone" => self.phone.clone(),
            "status" => self.status.clone(),
            "visitDate" => self.visit_date.clone(),
            _ => extra_text(&self.extra, field),
        }
    }
}
