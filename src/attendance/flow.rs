use serde::Deserialize;

use super::repo_types::Method;
use crate::error::{AppError, Capability};

/// Permission state the client reports for a host capability.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Grant {
    Granted,
    Denied,
    #[default]
    Unavailable,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct DeviceGrants {
    #[serde(default)]
    pub camera: Grant,
    #[serde(default)]
    pub bluetooth: Grant,
    #[serde(default)]
    pub geolocation: Grant,
}

impl DeviceGrants {
    pub fn get(&self, cap: Capability) -> Grant {
        match cap {
            Capability::Camera => self.camera,
            Capability::Bluetooth => self.bluetooth,
            Capability::Geolocation => self.geolocation,
        }
    }
}

/// Per-method affordance. The check pipeline is the same for every method;
/// only the host capabilities it needs differ.
pub trait VerificationFlow: Send + Sync {
    fn method(&self) -> Method;

    fn required(&self) -> &'static [Capability];

    fn prepare(&self, grants: &DeviceGrants) -> Result<(), AppError> {
        match self
            .required()
            .iter()
            .find(|cap| grants.get(**cap) != Grant::Granted)
        {
            Some(cap) => Err(AppError::DeviceAccessDenied(*cap)),
            None => Ok(()),
        }
    }
}

pub struct CodeScanFlow;
pub struct ProximityFlow;
pub struct FaceMatchFlow;
pub struct ManualFlow;

impl VerificationFlow for CodeScanFlow {
    fn method(&self) -> Method {
        Method::CodeScan
    }
    fn required(&self) -> &'static [Capability] {
        &[Capability::Camera, Capability::Geolocation]
    }
}

impl VerificationFlow for ProximityFlow {
    fn method(&self) -> Method {
        Method::Proximity
    }
    fn required(&self) -> &'static [Capability] {
        &[Capability::Bluetooth, Capability::Geolocation]
    }
}

impl VerificationFlow for FaceMatchFlow {
    fn method(&self) -> Method {
        Method::Face
    }
    fn required(&self) -> &'static [Capability] {
        &[Capability::Camera, Capability::Geolocation]
    }
}

impl VerificationFlow for ManualFlow {
    fn method(&self) -> Method {
        Method::Manual
    }
    fn required(&self) -> &'static [Capability] {
        &[Capability::Geolocation]
    }
}

impl Method {
    pub fn flow(&self) -> &'static dyn VerificationFlow {
        match self {
            Method::CodeScan => &CodeScanFlow,
            Method::Proximity => &ProximityFlow,
            Method::Face => &FaceMatchFlow,
            Method::Manual => &ManualFlow,
        }
    }
}
