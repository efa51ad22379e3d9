use serde::{Deserialize, Serialize};

/// The client's single login message on the first bidirectional stream.
/// Field names mirror the wire protocol exactly (`snake_case`, as emitted by
/// every existing client) — this is not a place to "improve" naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
	#[serde(rename = "type")]
	pub message_type: MessageType,
	pub token: String,
	pub client_version: String,
	pub os: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
	LoginRequest,
	LoginResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginStatus {
	Success,
	Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
	#[serde(rename = "type")]
	pub message_type: MessageType,
	pub status: LoginStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub assigned_vip: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub subnet_mask: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub server_vip: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub server_version: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

impl LoginResponse {
	pub fn success(assigned_vip: String, server_vip: String, subnet_mask: String, server_version: &str) -> Self {
		Self {
			message_type: MessageType::LoginResponse,
			status: LoginStatus::Success,
			assigned_vip: Some(assigned_vip),
			subnet_mask: Some(subnet_mask),
			server_vip: Some(server_vip),
			server_version: Some(server_version.to_string()),
			message: None,
		}
	}

	pub fn error(message: impl Into<String>) -> Self {
		Self {
			message_type: MessageType::LoginResponse,
			status: LoginStatus::Error,
			assigned_vip: None,
			subnet_mask: None,
			server_vip: None,
			server_version: None,
			message: Some(message.into()),
		}
	}
}

/// QUIC connection close codes. `0` covers both a graceful logout and any
/// other mid-session disconnect — those are never distinguished on the wire;
/// `1`-`3` are reserved for the three ways a login attempt itself can be
/// refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
	Normal = 0,
	Unauthorized = 1,
	PoolExhausted = 2,
	Banned = 3,
}

impl From<CloseCode> for quinn::VarInt {
	fn from(code: CloseCode) -> Self {
		quinn::VarInt::from_u32(code as u32)
	}
}
