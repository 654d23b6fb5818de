//! Remote SMS API integration
//!
//! This module provides:
//! - The [`SmsApi`] trait the engine talks through
//! - An HTTP client for the hosted API
//! - Response normalization to domain models

mod client;

pub use client::VoipClient;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

use crate::error::Error;
use crate::models::{Direction, Message, VoipId};

/// Remote status value meaning the request succeeded.
pub const STATUS_SUCCESS: &str = "success";
/// Remote status value meaning the retrieval window was empty. Not an error.
pub const STATUS_NO_SMS: &str = "no_sms";

/// Every timestamp the remote API accepts or returns is expressed in this
/// fixed offset, daylight saving time notwithstanding.
pub fn provider_offset() -> FixedOffset {
    // UTC-5
    FixedOffset::west_opt(5 * 3600).expect("static offset is in range")
}

/// The calendar date of an instant as the provider sees it.
pub fn provider_date(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&provider_offset()).date_naive()
}

/// Access to the remote message store.
///
/// Implementations are synchronous; the engine drives one request at a time.
pub trait SmsApi: Send + Sync {
    /// Retrieve the messages of `line` dated within `[from, to]` inclusive,
    /// interpreted in the provider's time zone.
    fn get_messages(
        &self,
        line: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Message>, Error>;

    /// Delete a message from the remote store.
    fn delete_message(&self, voip_id: VoipId) -> Result<(), Error>;

    /// Send one SMS from `line` to `contact`. The text must already fit in a
    /// single SMS.
    fn send_message(&self, line: &str, contact: &str, text: &str) -> Result<(), Error>;
}

/// Remote API response types
pub mod wire {
    use serde::Deserialize;

    /// Response from a message retrieval request
    #[derive(Debug, Deserialize)]
    pub struct GetSmsResponse {
        pub status: String,
        pub sms: Option<Vec<RawSms>>,
    }

    /// One message as the remote API encodes it. Every field arrives as a
    /// string, numeric content included.
    #[derive(Debug, Deserialize)]
    pub struct RawSms {
        pub id: String,
        pub date: String,
        #[serde(rename = "type")]
        pub direction: String,
        pub did: String,
        pub contact: String,
        pub message: String,
    }

    /// Response carrying only a status, returned by delete and send
    #[derive(Debug, Deserialize)]
    pub struct StatusResponse {
        pub status: String,
    }
}

/// Convert a wire message into a domain [`Message`].
///
/// Incoming messages start out unread; reconciliation decides whether that
/// survives the merge against local state. Every retrieved copy is
/// delivered by definition: the remote store only holds messages it has
/// accepted.
pub fn normalize_message(raw: &wire::RawSms) -> Result<Message, Error> {
    let voip_id: i64 = raw
        .id
        .parse()
        .map_err(|_| Error::Parse(format!("invalid message id {:?}", raw.id)))?;

    let code: u8 = raw
        .direction
        .parse()
        .map_err(|_| Error::Parse(format!("invalid direction {:?}", raw.direction)))?;
    let direction = Direction::from_code(code)
        .ok_or_else(|| Error::Parse(format!("invalid direction {:?}", raw.direction)))?;

    let date = parse_provider_date(&raw.date)?;

    Ok(Message::builder(raw.did.clone(), raw.contact.clone())
        .voip_id(VoipId::new(voip_id))
        .date(date)
        .direction(direction)
        .text(raw.message.clone())
        .unread(direction == Direction::Incoming)
        .delivered(true)
        .build())
}

/// Parse a `yyyy-MM-dd HH:mm:ss` timestamp in the provider's zone.
fn parse_provider_date(s: &str) -> Result<DateTime<Utc>, Error> {
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| Error::Parse(format!("invalid date {:?}: {}", s, e)))?;

    naive
        .and_local_timezone(provider_offset())
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| Error::Parse(format!("ambiguous date {:?}", s)))
}
