use quinn::{RecvStream, SendStream};

use crate::{ProtoError, types::LoginRequest};

/// Login messages are a single small JSON object per connection; a generous
/// bound keeps a misbehaving or hostile peer from forcing an unbounded read.
pub const MAX_LOGIN_MESSAGE_LEN: usize = 4096;

pub async fn read_login_request(recv: &mut RecvStream) -> Result<LoginRequest, ProtoError> {
	let data = recv.read_to_end(MAX_LOGIN_MESSAGE_LEN).await?;
	let req = serde_json::from_slice(&data)?;
	Ok(req)
}

pub async fn write_login_response(send: &mut SendStream, resp: &crate::types::LoginResponse) -> Result<(), ProtoError> {
	let data = serde_json::to_vec(resp)?;
	if data.len() > MAX_LOGIN_MESSAGE_LEN {
		return Err(ProtoError::TooLarge);
	}
	send.write_all(&data).await?;
	send.finish().map_err(|_| ProtoError::TooLarge)?;
	Ok(())
}
