//! Call bounded context - the local mirror of one telephony session

pub mod aggregate;
pub mod event;
pub mod value_object;
pub mod view;

pub use aggregate::Call;
pub use event::{CallChange, CallEvent};
pub use value_object::{CallDirection, CallStatus, Handle, HandleKind};
pub use view::{CallSnapshot, CallView};
