//! Stemcell image metadata

use nodeflow_cloud::{ImageReference, ImageSource, OsType};
use serde::{Deserialize, Serialize};

/// Image a VM boots from, as resolved by the stemcell manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Image resource id (managed disks) or image blob URI (unmanaged disks)
    pub uri: String,

    pub os_type: OsType,

    /// Platform catalog coordinates; set only for light stemcells
    #[serde(default)]
    pub image_reference: Option<ImageReference>,

    /// Size of the image in MiB
    #[serde(default)]
    pub image_size_mb: Option<u32>,
}

impl ImageMetadata {
    pub fn is_light_stemcell(&self) -> bool {
        self.image_reference.is_some()
    }

    /// Select the one image source submitted with the VM
    pub fn image_source(&self, use_managed_disks: bool) -> ImageSource {
        match &self.image_reference {
            Some(reference) => ImageSource::Catalog(reference.clone()),
            None if use_managed_disks => ImageSource::ImageId(self.uri.clone()),
            None => ImageSource::ImageUri(self.uri.clone()),
        }
    }
}
