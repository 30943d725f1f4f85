//! Declared Image resource: a name resolved to a backend image tag

use crate::meta::{impl_resource, ObjectMeta, ResourceKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub metadata: ObjectMeta,
    pub spec: ImageSpec,
}

impl_resource!(Image, ResourceKind::Image);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub tag: String,
}
