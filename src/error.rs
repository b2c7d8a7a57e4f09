use crate::scheduler::ComponentId;
use thiserror::Error;

/// A [`Dom`](`crate::dom::Dom`) operation that couldn't be carried out.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DomError {
	#[error("the reference node is not a child of the given parent")]
	NotAChild,
	#[error("expected a text or comment node")]
	NotCharacterData,
	#[error("expected an element")]
	NotAnElement,
	#[error("offset {offset} is not a character boundary within text of length {len}")]
	InvalidOffset { offset: usize, len: usize },
	#[error("a node can't be inserted into itself or its descendants")]
	HierarchyRequest,
	/// The backing DOM implementation threw or otherwise refused the operation.
	#[error("DOM operation failed: {0}")]
	Backend(String),
}

/// Returned by a component's patch closure to abort the current flush.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct PatchError {
	message: String,
	#[source]
	source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}
impl PatchError {
	#[must_use]
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			source: None,
		}
	}

	#[must_use]
	pub fn with_source(message: impl Into<String>, source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
		Self {
			message: message.into(),
			source: Some(source.into()),
		}
	}

	#[must_use]
	pub fn message(&self) -> &str {
		&self.message
	}
}

impl From<DomError> for PatchError {
	fn from(error: DomError) -> Self {
		Self::with_source("DOM patch failed", error)
	}
}

/// Why [`Scheduler::flush`](`crate::scheduler::Scheduler::flush`) stopped early.
///
/// Any pending scheduler state has already been reset when this is returned.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FlushError {
	#[error("patching {component} failed")]
	Patch {
		component: ComponentId,
		#[source]
		source: PatchError,
	},
}

/// Why [`init`](`crate::init::init`) failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InitError {
	/// Claiming or mounting failed. The component has been destroyed again.
	#[error("claiming or mounting {component} failed")]
	Dom {
		component: ComponentId,
		#[source]
		source: DomError,
	},
	/// The first flush failed. The component stays mounted.
	#[error(transparent)]
	Flush(#[from] FlushError),
}
