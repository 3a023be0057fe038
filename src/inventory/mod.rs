/*!
 * Process Inventory
 * Snapshot-based process cache with per-record handle ownership
 */

mod cache;
mod record;

pub use cache::ProcessCache;
pub(crate) use cache::HandleLookup;
pub use record::ProcessEntry;
