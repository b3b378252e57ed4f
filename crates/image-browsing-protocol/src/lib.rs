//! Wire types for the host application's `/image-browsing/*` routes.
//!
//! Shared by the listing cache (which stores [`DirectoryEntry`] records) and
//! the HTTP client (which decodes them). Every response type tolerates missing
//! and unknown fields, since the server payloads carry no schema version.

mod types;

pub use types::{
    BatchItem, BatchRequest, BatchResponse, DeleteRequest, DirectoryEntry, EntryKind,
    ListingResponse, MoveRequest, MutationResponse, RenameRequest,
};
