//! Shared data model for Libris.
//!
//! This crate defines the "vocabulary" every other layer speaks:
//!
//! - **Types** ([`CurrentUser`], [`Role`], [`AuthSession`],
//!   [`SessionChange`], [`ProfileRecord`], ...): the values that come back
//!   from the hosted backend or go out to the UI.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how backend payloads
//!   are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while decoding.
//!
//! # Architecture
//!
//! ```text
//! Backend (HTTP / in-memory) → Protocol (typed payloads) → Session (reconciler)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    AuthSession, AuthUser, CurrentUser, Notice, NoticeLevel, ProfileRecord,
    Role, Route, SessionChange, SessionEventKind, UserId, UserMetadata,
};
