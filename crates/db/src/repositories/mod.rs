mod alert_repo;
mod attachment_repo;
mod busy_block_repo;
mod credential_repo;
mod job_lock_repo;
mod mapping_repo;
mod sync_state_repo;
mod user_repo;
mod webhook_channel_repo;

pub use alert_repo::AlertRepository;
pub use attachment_repo::AttachmentRepository;
pub use busy_block_repo::BusyBlockRepository;
pub use credential_repo::CredentialRepository;
pub use job_lock_repo::JobLockRepository;
pub use mapping_repo::MappingRepository;
pub use sync_state_repo::SyncStateRepository;
pub use user_repo::UserRepository;
pub use webhook_channel_repo::WebhookChannelRepository;
