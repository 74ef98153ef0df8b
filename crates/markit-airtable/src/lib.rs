//! Airtable persistence for marketing briefs.
//!
//! [`AirtableClient`] speaks the Airtable REST API; [`RecordStore`] is the
//! narrow interface the brief pipeline and chat depend on.

pub mod client;
pub mod error;
pub mod fields;
pub mod store;

pub use client::AirtableClient;
pub use error::PersistenceError;
pub use fields::FieldMap;
pub use store::{Record, RecordStore};
