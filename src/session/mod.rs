/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Reservation sessions.
//!
//! A session groups the numbers one user reserved for one equipment and
//! tracks which of them are already bound to documents.
//!
//! ```text
//!            assign last number               grace window ends
//!  Active ----------------------> Draining ----------------------> Closed
//!    |                                                               ^
//!    +------------------- TTL lapses / cancel -----------------------+
//! ```
//!
//! Closing a session hands its unassigned numbers back to the allocator.

pub mod manager;
pub mod state;

#[cfg(test)]
pub(crate) mod tests;

pub use manager::SessionManager;
pub use state::{
    NumberRequest, NumberStatus, ReservationKind, ReservationSession, SessionNumber,
    SessionSnapshot, SessionState,
};
