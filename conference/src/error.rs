//! Error types for the conference services.

use conference_central_core::cache::CacheError;
use conference_central_core::{EntityKey, ParseKeyError, StoreError};
use conference_central_runtime::TransactionError;
use std::fmt;
use thiserror::Error;

/// Why a registration or unregistration was refused.
///
/// These are expected business outcomes, not failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConflictReason {
    /// The profile already lists the conference
    AlreadyRegistered,
    /// The profile does not list the conference
    NotRegistered,
    /// No seats are left
    SoldOut,
    /// Giving a seat back would exceed capacity
    AtCapacity,
}

impl ConflictReason {
    /// Stable machine-readable code
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::AlreadyRegistered => "already_registered",
            Self::NotRegistered => "not_registered",
            Self::SoldOut => "sold_out",
            Self::AtCapacity => "at_capacity",
        }
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Seat counters would leave `0..=max_attendees`.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum SeatInvariantError {
    /// More seats taken than are available
    #[error("cannot book {requested} seat(s): only {available} available")]
    Oversold {
        /// Seats available before the attempt
        available: u32,
        /// Seats requested
        requested: u32,
    },

    /// More seats returned than are booked
    #[error("cannot return {returned} seat(s): {available} of {max_attendees} already available")]
    OverCapacity {
        /// Seats available before the attempt
        available: u32,
        /// Capacity
        max_attendees: u32,
        /// Seats being returned
        returned: u32,
    },

    /// Stored counters are already outside their bounds
    #[error("{available} seats available exceeds capacity {max_attendees}")]
    OutOfBounds {
        /// Seats available as stored
        available: u32,
        /// Capacity as stored
        max_attendees: u32,
    },
}

/// A submitted form was rejected.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum FormError {
    /// Name is blank
    #[error("name is required")]
    MissingName,

    /// A speaker name is blank
    #[error("speaker names must not be blank")]
    BlankSpeaker,

    /// Capacity revision would drop below the seats already booked
    #[error("max attendees {requested} is below the {booked} seat(s) already booked")]
    CapacityBelowBooked {
        /// Seats currently booked
        booked: u32,
        /// Requested capacity
        requested: u32,
    },
}

/// Errors returned by the conference services.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// A conference or session reference did not parse, or named the wrong kind
    #[error("invalid {expected} reference {reference:?}: {reason}")]
    InvalidKey {
        /// Kind the reference should name
        expected: &'static str,
        /// The reference as given
        reference: String,
        /// What was wrong
        reason: String,
    },

    /// Form validation failed
    #[error("invalid form: {0}")]
    InvalidForm(#[from] FormError),

    /// Only the organizer may modify a conference
    #[error("{user} is not the organizer of {conference}")]
    NotOrganizer {
        /// Caller's user id
        user: String,
        /// Conference key
        conference: EntityKey,
    },

    /// Stored seat counters were found outside their bounds
    #[error("seat invariant violated on {conference}: {reason}")]
    InvariantViolation {
        /// Conference key
        conference: EntityKey,
        /// Details
        reason: String,
    },

    /// The transaction failed or retries were exhausted
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// A store read outside any transaction failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The session was committed but a speaker could not be linked to it
    #[error("session {session} saved but linking speaker {speaker:?} failed: {source}")]
    SpeakerLink {
        /// Key of the committed session
        session: EntityKey,
        /// Speaker name that failed
        speaker: String,
        /// Underlying failure
        #[source]
        source: TransactionError,
    },

    /// Publishing or reading a cached value failed
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl ServiceError {
    /// Build an `InvalidKey` for a reference that failed to parse
    pub(crate) fn unparsable(expected: &'static str, reference: &str, err: &ParseKeyError) -> Self {
        Self::InvalidKey {
            expected,
            reference: reference.to_string(),
            reason: err.to_string(),
        }
    }

    /// Build an `InvalidKey` for a reference naming the wrong kind
    pub(crate) fn wrong_kind(expected: &'static str, reference: &str, key: &EntityKey) -> Self {
        Self::InvalidKey {
            expected,
            reference: reference.to_string(),
            reason: format!("names a {} key", key.kind()),
        }
    }
}

/// Result type for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;
