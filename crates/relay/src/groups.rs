use async_trait::async_trait;

use crate::transport::TransportError;

/// Chat groups that receive a copy of every completed order.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    async fn active_groups(&self) -> Result<Vec<String>, TransportError>;
}

#[derive(Clone, Debug, Default)]
pub struct StaticGroupDirectory {
    groups: Vec<String>,
}

impl StaticGroupDirectory {
    pub fn new(groups: impl IntoIterator<Item = String>) -> Self {
        Self {
            groups: groups
                .into_iter()
                .map(|group| group.trim().to_string())
                .filter(|group| !group.is_empty())
                .collect(),
        }
    }
}

#[async_trait]
impl GroupDirectory for StaticGroupDirectory {
    async fn active_groups(&self) -> Result<Vec<String>, TransportError> {
        Ok(self.groups.clone())
    }
}
