use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity attached to every order and trade side.
///
/// `origin` keeps pointing at the device that created the order while
/// `name`/`uuid` are rewritten to the posting market agent each time the
/// order is forwarded to a neighbouring market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraderDetails {
    pub name: String,
    pub uuid: Uuid,
    pub origin: String,
    pub origin_uuid: Uuid,
}

impl TraderDetails {
    /// Details for an order posted directly by its originating device
    pub fn new(name: impl Into<String>, uuid: Uuid) -> Self {
        let name = name.into();
        Self {
            origin: name.clone(),
            origin_uuid: uuid,
            name,
            uuid,
        }
    }

    /// Details for an order reposted on behalf of `origin` by a market agent
    pub fn relayed(name: impl Into<String>, uuid: Uuid, origin: &TraderDetails) -> Self {
        Self {
            name: name.into(),
            uuid,
            origin: origin.origin.clone(),
            origin_uuid: origin.origin_uuid,
        }
    }
}
