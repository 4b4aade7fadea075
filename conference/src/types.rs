//! Domain types for Conference Central.
//!
//! This module contains the stored entities (Profile, Conference, Session, Speaker),
//! the forms callers submit, and the identity of an authenticated caller.
//!
//! Ownership is expressed through keys: a Conference is stored under its organizer's
//! Profile key and a Session under its Conference key, so a Conference and its
//! Sessions share one entity group.

use crate::error::{FormError, SeatInvariantError};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use conference_central_core::{Entity, EntityKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// City used when a conference form names none.
pub const DEFAULT_CITY: &str = "Default City";

/// Topics used when a conference form names none.
pub const DEFAULT_TOPICS: [&str; 2] = ["Default", "Topic"];

// ============================================================================
// Identifiers
// ============================================================================

/// Stable identifier of an authenticated user.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Creates a `UserId` from the identity provider's stable id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The already-authenticated caller of an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    /// Stable user id
    pub user_id: UserId,
    /// Contact email reported by the identity provider
    pub email: String,
}

impl Caller {
    /// Creates a new `Caller`
    #[must_use]
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            email: email.into(),
        }
    }
}

/// Display name derived from an email: the part before `@`.
///
/// ```
/// use conference_central::types::default_display_name;
///
/// assert_eq!(default_display_name("lemoncake@example.com"), "lemoncake");
/// assert_eq!(default_display_name("no-at-sign"), "no-at-sign");
/// ```
#[must_use]
pub fn default_display_name(email: &str) -> String {
    email.split_once('@').map_or(email, |(local, _)| local).to_string()
}

// ============================================================================
// Profile
// ============================================================================

/// Apparel size preference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeeShirtSize {
    /// No preference given
    #[default]
    NotSpecified,
    /// Extra small
    Xs,
    /// Small
    S,
    /// Medium
    M,
    /// Large
    L,
    /// Extra large
    Xl,
    /// 2x large
    Xxl,
    /// 3x large
    Xxxl,
}

/// A user's profile and the conferences they are attending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    user_id: UserId,
    /// Name shown to other users
    pub display_name: String,
    /// Contact email
    pub main_email: String,
    /// Apparel size preference
    pub tee_shirt_size: TeeShirtSize,
    conference_keys_to_attend: Vec<String>,
}

impl Profile {
    /// Creates a new profile with an empty attendance list
    #[must_use]
    pub fn new(
        user_id: UserId,
        display_name: impl Into<String>,
        main_email: impl Into<String>,
        tee_shirt_size: TeeShirtSize,
    ) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            main_email: main_email.into(),
            tee_shirt_size,
            conference_keys_to_attend: Vec::new(),
        }
    }

    /// Profile a caller gets on first interaction: name from email, no size preference
    #[must_use]
    pub fn for_caller(caller: &Caller) -> Self {
        Self::new(
            caller.user_id.clone(),
            default_display_name(&caller.email),
            caller.email.clone(),
            TeeShirtSize::NotSpecified,
        )
    }

    /// Key of the profile owned by `user_id`
    #[must_use]
    pub fn key_for(user_id: &UserId) -> EntityKey {
        EntityKey::named(Self::KIND, user_id.as_str())
    }

    /// Owner of this profile
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Conference references in registration order
    #[must_use]
    pub fn conference_keys_to_attend(&self) -> &[String] {
        &self.conference_keys_to_attend
    }

    /// Whether the profile is attending `conference_ref`
    #[must_use]
    pub fn is_attending(&self, conference_ref: &str) -> bool {
        self.conference_keys_to_attend
            .iter()
            .any(|existing| existing == conference_ref)
    }

    /// Append `conference_ref` unless already present. Returns whether it was added.
    pub fn add_attendance(&mut self, conference_ref: &str) -> bool {
        if self.is_attending(conference_ref) {
            return false;
        }
        self.conference_keys_to_attend.push(conference_ref.to_string());
        true
    }

    /// Remove `conference_ref` if present. Returns whether it was removed.
    pub fn remove_attendance(&mut self, conference_ref: &str) -> bool {
        let before = self.conference_keys_to_attend.len();
        self.conference_keys_to_attend
            .retain(|existing| existing != conference_ref);
        self.conference_keys_to_attend.len() != before
    }

    /// Overwrite the fields present in `form`
    pub fn apply(&mut self, form: &ProfileForm) {
        if let Some(display_name) = &form.display_name {
            self.display_name.clone_from(display_name);
        }
        if let Some(size) = form.tee_shirt_size {
            self.tee_shirt_size = size;
        }
    }
}

impl Entity for Profile {
    const KIND: &'static str = "Profile";

    fn key(&self) -> EntityKey {
        Self::key_for(&self.user_id)
    }
}

/// Profile fields a user may edit. Absent fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileForm {
    /// New display name
    pub display_name: Option<String>,
    /// New apparel size
    pub tee_shirt_size: Option<TeeShirtSize>,
}

// ============================================================================
// Conference
// ============================================================================

/// What an organizer submits to create or revise a conference.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceForm {
    /// Conference name (required)
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
    /// Topic tags
    pub topics: Vec<String>,
    /// Host city
    pub city: Option<String>,
    /// First day
    pub start_date: Option<DateTime<Utc>>,
    /// Last day
    pub end_date: Option<DateTime<Utc>>,
    /// Capacity
    pub max_attendees: u32,
}

impl ConferenceForm {
    /// Apply defaults and validate.
    ///
    /// Trims the name, fills in [`DEFAULT_TOPICS`] and [`DEFAULT_CITY`] when absent.
    ///
    /// # Errors
    ///
    /// Returns `FormError::MissingName` if the name is blank.
    pub fn normalized(mut self) -> Result<Self, FormError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(FormError::MissingName);
        }
        self.name = name.to_string();

        self.topics.retain(|topic| !topic.trim().is_empty());
        if self.topics.is_empty() {
            self.topics = DEFAULT_TOPICS.iter().map(ToString::to_string).collect();
        }
        if self.city.as_deref().is_none_or(|city| city.trim().is_empty()) {
            self.city = Some(DEFAULT_CITY.to_string());
        }
        Ok(self)
    }
}

/// A conference and its seat counters.
///
/// Seats change only through [`Conference::book_seats`] and
/// [`Conference::give_back_seats`], which keep `0 <= seats_available <= max_attendees`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conference {
    id: u64,
    organizer_user_id: UserId,
    /// Conference name
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
    /// Topic tags (never empty)
    pub topics: Vec<String>,
    /// Host city
    pub city: String,
    /// First day
    pub start_date: Option<DateTime<Utc>>,
    /// Last day
    pub end_date: Option<DateTime<Utc>>,
    /// Month (1-12) of `start_date`, 0 when there is none
    pub month: u32,
    max_attendees: u32,
    seats_available: u32,
}

impl Conference {
    /// Create a conference from a normalized form. All seats start available.
    #[must_use]
    pub fn new(id: u64, organizer: &UserId, form: &ConferenceForm) -> Self {
        let mut conference = Self {
            id,
            organizer_user_id: organizer.clone(),
            name: String::new(),
            description: None,
            topics: Vec::new(),
            city: DEFAULT_CITY.to_string(),
            start_date: None,
            end_date: None,
            month: 0,
            max_attendees: form.max_attendees,
            seats_available: form.max_attendees,
        };
        conference.apply_descriptive_fields(form);
        conference
    }

    /// Rewrite descriptive fields and revise capacity from a normalized form.
    ///
    /// Seats already booked stay booked: the new availability is
    /// `new_max - (old_max - old_available)`.
    ///
    /// # Errors
    ///
    /// Returns `FormError::CapacityBelowBooked` (and changes nothing) if the new
    /// maximum is smaller than the number of booked seats.
    pub fn update_with_form(&mut self, form: &ConferenceForm) -> Result<(), FormError> {
        let booked = self.seats_booked();
        if form.max_attendees < booked {
            return Err(FormError::CapacityBelowBooked {
                booked,
                requested: form.max_attendees,
            });
        }
        self.apply_descriptive_fields(form);
        self.max_attendees = form.max_attendees;
        self.seats_available = form.max_attendees - booked;
        Ok(())
    }

    fn apply_descriptive_fields(&mut self, form: &ConferenceForm) {
        self.name.clone_from(&form.name);
        self.description.clone_from(&form.description);
        self.topics.clone_from(&form.topics);
        self.city = form
            .city
            .clone()
            .unwrap_or_else(|| DEFAULT_CITY.to_string());
        self.start_date = form.start_date;
        self.end_date = form.end_date;
        self.month = form.start_date.map_or(0, |start| start.month());
    }

    /// Key of conference `id` organized by `organizer`
    #[must_use]
    pub fn key_for(organizer: &UserId, id: u64) -> EntityKey {
        Profile::key_for(organizer).child_with_id(Self::KIND, id)
    }

    /// Canonical reference string of this conference (its key's text form)
    #[must_use]
    pub fn websafe_key(&self) -> String {
        self.key().to_string()
    }

    /// Store-allocated id
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Organizer's user id
    #[must_use]
    pub const fn organizer_user_id(&self) -> &UserId {
        &self.organizer_user_id
    }

    /// Capacity
    #[must_use]
    pub const fn max_attendees(&self) -> u32 {
        self.max_attendees
    }

    /// Seats not yet booked
    #[must_use]
    pub const fn seats_available(&self) -> u32 {
        self.seats_available
    }

    /// Seats currently booked
    #[must_use]
    pub const fn seats_booked(&self) -> u32 {
        self.max_attendees.saturating_sub(self.seats_available)
    }

    /// Verify `seats_available <= max_attendees` on a loaded value.
    ///
    /// # Errors
    ///
    /// Returns `SeatInvariantError::OutOfBounds` when the stored counters disagree.
    pub const fn check_seats(&self) -> Result<(), SeatInvariantError> {
        if self.seats_available > self.max_attendees {
            return Err(SeatInvariantError::OutOfBounds {
                available: self.seats_available,
                max_attendees: self.max_attendees,
            });
        }
        Ok(())
    }

    /// Take `count` seats.
    ///
    /// # Errors
    ///
    /// Returns `SeatInvariantError::Oversold` if fewer than `count` seats are left.
    pub const fn book_seats(&mut self, count: u32) -> Result<(), SeatInvariantError> {
        if self.seats_available < count {
            return Err(SeatInvariantError::Oversold {
                available: self.seats_available,
                requested: count,
            });
        }
        self.seats_available -= count;
        Ok(())
    }

    /// Return `count` seats.
    ///
    /// # Errors
    ///
    /// Returns `SeatInvariantError::OverCapacity` if that would exceed `max_attendees`.
    pub const fn give_back_seats(&mut self, count: u32) -> Result<(), SeatInvariantError> {
        if count > self.seats_booked() {
            return Err(SeatInvariantError::OverCapacity {
                available: self.seats_available,
                max_attendees: self.max_attendees,
                returned: count,
            });
        }
        self.seats_available += count;
        Ok(())
    }
}

impl Entity for Conference {
    const KIND: &'static str = "Conference";

    fn key(&self) -> EntityKey {
        Self::key_for(&self.organizer_user_id, self.id)
    }
}

/// Equality filters for [`ProfileService::query_conferences`](crate::ProfileService::query_conferences).
///
/// Unset fields match everything. An empty query returns every conference.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceQuery {
    /// Host city, exact match
    pub city: Option<String>,
    /// A topic the conference must carry
    pub topic: Option<String>,
    /// Start month (1-12)
    pub month: Option<u32>,
    /// Only conferences with `0 < seats_available < n`
    pub seats_below: Option<u32>,
}

impl ConferenceQuery {
    /// Whether `conference` passes every set filter.
    #[must_use]
    pub fn matches(&self, conference: &Conference) -> bool {
        self.city.as_ref().is_none_or(|city| &conference.city == city)
            && self
                .topic
                .as_ref()
                .is_none_or(|topic| conference.topics.contains(topic))
            && self.month.is_none_or(|month| conference.month == month)
            && self.seats_below.is_none_or(|limit| {
                conference.seats_available > 0 && conference.seats_available < limit
            })
    }
}

// ============================================================================
// Session & Speaker
// ============================================================================

/// What an organizer submits to create a session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionForm {
    /// Session name (required)
    pub name: String,
    /// Short description
    pub highlights: Option<String>,
    /// Talk, workshop, keynote, ... (free-form)
    pub type_of_session: Option<String>,
    /// Speaker display names, in order; repeats allowed
    pub speakers: Vec<String>,
    /// Scheduled day
    pub date: Option<NaiveDate>,
    /// Start time on that day
    pub start_time: Option<NaiveTime>,
    /// Length in minutes
    pub duration_minutes: Option<u32>,
}

impl SessionForm {
    /// Validate and trim the form.
    ///
    /// # Errors
    ///
    /// Returns `FormError::MissingName` if the session name is blank, or
    /// `FormError::BlankSpeaker` if a speaker name is blank.
    pub fn normalized(mut self) -> Result<Self, FormError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(FormError::MissingName);
        }
        self.name = name.to_string();

        for speaker in &mut self.speakers {
            let trimmed = speaker.trim();
            if trimmed.is_empty() {
                return Err(FormError::BlankSpeaker);
            }
            *speaker = trimmed.to_string();
        }
        Ok(self)
    }
}

/// A session of a conference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: u64,
    conference_key: EntityKey,
    /// Session name
    pub name: String,
    /// Short description
    pub highlights: Option<String>,
    /// Talk, workshop, keynote, ...
    pub type_of_session: Option<String>,
    /// Speaker names as submitted
    pub speakers: Vec<String>,
    /// Scheduled day
    pub date: Option<NaiveDate>,
    /// Start time
    pub start_time: Option<NaiveTime>,
    /// Length in minutes
    pub duration_minutes: Option<u32>,
}

impl Session {
    /// Create a session from a normalized form
    #[must_use]
    pub fn new(id: u64, conference_key: EntityKey, form: &SessionForm) -> Self {
        Self {
            id,
            conference_key,
            name: form.name.clone(),
            highlights: form.highlights.clone(),
            type_of_session: form.type_of_session.clone(),
            speakers: form.speakers.clone(),
            date: form.date,
            start_time: form.start_time,
            duration_minutes: form.duration_minutes,
        }
    }

    /// Store-allocated id
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Key of the owning conference
    #[must_use]
    pub const fn conference_key(&self) -> &EntityKey {
        &self.conference_key
    }

    /// Each distinct speaker name with the number of times it is listed,
    /// in order of first appearance.
    #[must_use]
    pub fn speaker_occurrences(&self) -> Vec<(String, usize)> {
        let mut occurrences: Vec<(String, usize)> = Vec::new();
        for name in &self.speakers {
            match occurrences.iter_mut().find(|(seen, _)| seen == name) {
                Some((_, count)) => *count += 1,
                None => occurrences.push((name.clone(), 1)),
            }
        }
        occurrences
    }
}

impl Entity for Session {
    const KIND: &'static str = "Session";

    fn key(&self) -> EntityKey {
        self.conference_key.child_with_id(Self::KIND, self.id)
    }
}

/// A speaker and the sessions they present.
///
/// Speakers are stored under their display name, which is what de-duplicates them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speaker {
    id: u64,
    name: String,
    sessions: Vec<EntityKey>,
}

impl Speaker {
    /// Create a speaker with no sessions
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            sessions: Vec::new(),
        }
    }

    /// Key of the speaker called `name`
    #[must_use]
    pub fn key_for(name: &str) -> EntityKey {
        EntityKey::named(Self::KIND, name)
    }

    /// Store-allocated id
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Session keys in the order they were linked
    #[must_use]
    pub fn sessions(&self) -> &[EntityKey] {
        &self.sessions
    }

    /// Append `session` until it appears `occurrences` times.
    ///
    /// Never removes entries, so re-running a link is a no-op. Returns whether
    /// anything was appended.
    pub fn ensure_session(&mut self, session: &EntityKey, occurrences: usize) -> bool {
        let present = self.sessions.iter().filter(|s| *s == session).count();
        if present >= occurrences {
            return false;
        }
        for _ in present..occurrences {
            self.sessions.push(session.clone());
        }
        true
    }
}

impl Entity for Speaker {
    const KIND: &'static str = "Speaker";

    fn key(&self) -> EntityKey {
        Self::key_for(&self.name)
    }
}
