/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Commands accepted by an equipment worker.
//!
//! Each command carries its own reply channel, so the worker answers every
//! caller with exactly the type it asked for. `owner` is the session that
//! holds the numbers, `None` for reservations outside any session.

use super::sequence::SequenceSnapshot;
use crate::error::Result;
use crate::ledger::{AssignedDocument, CommitRequest};
use crate::numbering::GoldenFilter;
use crate::types::SessionToken;
use tokio::sync::oneshot;

pub(crate) type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
pub(crate) enum AllocatorCommand {
    Sequential {
        count: usize,
        skip_golden: bool,
        owner: Option<SessionToken>,
        reply: Reply<Result<Vec<u64>>>,
    },
    Specific {
        numbers: Vec<u64>,
        owner: Option<SessionToken>,
        reply: Reply<Result<Vec<u64>>>,
    },
    Golden {
        count: usize,
        filter: GoldenFilter,
        owner: Option<SessionToken>,
        reply: Reply<Result<Vec<u64>>>,
    },
    /// Read-only golden search; reserves nothing.
    SuggestGolden {
        count: usize,
        filter: GoldenFilter,
        reply: Reply<Vec<u64>>,
    },
    Claim {
        numbers: Vec<u64>,
        owner: SessionToken,
        reply: Reply<Result<()>>,
    },
    Release {
        numbers: Vec<u64>,
        owner: Option<SessionToken>,
        reply: Reply<Vec<u64>>,
    },
    Commit {
        request: CommitRequest,
        reply: Reply<Result<AssignedDocument>>,
    },
    Snapshot {
        reply: Reply<SequenceSnapshot>,
    },
}
