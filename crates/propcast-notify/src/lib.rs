//! Outbound card dispatch.
//!
//! The core hands a finished `ProposalCard` to this crate; formatting and
//! transport live here. Two paths: the chat notifier (HTML card) and an
//! optional fire-and-forget JSON postback.

pub mod error;
pub mod format;
pub mod postback;
pub mod telegram;

pub use error::NotifyError;
pub use format::card_html;
pub use postback::PostbackClient;
pub use telegram::Notifier;
