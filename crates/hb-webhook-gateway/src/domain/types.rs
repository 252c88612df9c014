//! Core types for the Webhook Gateway.
//!
//! Wire structures for the WeCom callback (outer encrypted envelope, inner
//! decrypted message) and the recipe record handed to collaborators.

use crate::domain::error::WebhookError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier of a request's origin (peer address).
pub type ClientKey = String;

/// Query parameters sent by the platform on every callback.
///
/// The platform names the signature `msg_signature`; plain `signature` is
/// accepted as an alias.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WebhookQuery {
    #[serde(alias = "signature")]
    pub msg_signature: Option<String>,
    pub timestamp: Option<String>,
    pub nonce: Option<String>,
    /// Only present on the URL verification handshake
    pub echostr: Option<String>,
}

/// Outer callback body: `<xml><ToUserName/><AgentID/><Encrypt/></xml>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EncryptedEnvelope {
    #[serde(rename = "ToUserName")]
    pub to_user_name: Option<String>,
    #[serde(rename = "AgentID")]
    pub agent_id: Option<String>,
    #[serde(rename = "Encrypt")]
    pub encrypt: String,
}

impl EncryptedEnvelope {
    pub fn from_xml(body: &str) -> Result<Self, WebhookError> {
        quick_xml::de::from_str(body)
            .map_err(|e| WebhookError::MalformedMessage(format!("envelope: {}", e)))
    }
}

/// Plaintext message recovered from the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DecryptedMessage {
    #[serde(rename = "MsgType")]
    pub msg_type: String,
    #[serde(rename = "FromUserName")]
    pub from_user: String,
    /// Absent for events and non-text messages
    #[serde(rename = "Content")]
    pub content: Option<String>,
}

impl DecryptedMessage {
    pub fn from_xml(xml: &str) -> Result<Self, WebhookError> {
        quick_xml::de::from_str(xml)
            .map_err(|e| WebhookError::MalformedMessage(format!("message: {}", e)))
    }

    pub fn is_text(&self) -> bool {
        self.msg_type == "text"
    }
}

/// Recipe record as stored by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub title: String,
    pub ingredients: Vec<String>,
    pub instructions: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat: Option<f64>,
}

impl Recipe {
    /// Stand-in sent when the lookup finds nothing for a request.
    pub fn placeholder(include: &BTreeSet<String>) -> Self {
        Self {
            title: "Suggested recipe".to_string(),
            ingredients: include.iter().cloned().collect(),
            instructions: "Cooking steps are not available yet.".to_string(),
            tags: Vec::new(),
            calories: None,
            protein: None,
            carbs: None,
            fat: None,
        }
    }

    pub fn contains_all(&self, include: &BTreeSet<String>) -> bool {
        include.iter().all(|i| self.ingredients.iter().any(|own| own == i))
    }

    pub fn has_any_tag(&self, exclude: &BTreeSet<String>) -> bool {
        self.tags.iter().any(|t| exclude.contains(t))
    }
}
