#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
	#[error("failed reading login stream: {0}")]
	Read(#[from] quinn::ReadToEndError),

	#[error("failed writing login stream: {0}")]
	Write(#[from] quinn::WriteError),

	#[error("login message was not valid JSON: {0}")]
	Json(#[from] serde_json::Error),

	#[error("login stream exceeded the maximum message size")]
	TooLarge,
}
