/*!
 * Core update engine
 */

pub mod bulk_sync;
pub mod checksum;
pub mod delta;
pub mod file_sync;
pub mod layout;
pub mod progress;
pub mod publish;

pub use bulk_sync::{BulkPhase, BulkSync};
pub use delta::{BlockInfo, BlockSource, DeltaEngine, DeltaPlan, DiffResult, RollingEngine};
pub use file_sync::{FileSync, SyncContext};
pub use layout::SyncRoot;
pub use progress::{ProgressEvent, ProgressPublisher, ProgressSubscriber, SyncPass};
pub use publish::{publish, PublishOptions, PublishReport};
