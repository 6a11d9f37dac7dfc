use uuid::Uuid;

/// Generates unique task runner identifiers
pub trait GuidProvider: Send + Sync {
    fn new_guid(&self) -> String;
}

/// Random v4 UUIDs
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGuidProvider;

impl GuidProvider for UuidGuidProvider {
    fn new_guid(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
