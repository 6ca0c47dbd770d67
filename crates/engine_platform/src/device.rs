//! Device enumerator (§4.I): `{deviceId, friendlyName, isDefault}` for
//! render and capture sets, `cpal`-backed on every platform, the same
//! API `gecko_core::device::AudioDevice::enumerate_all` wraps.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDirection {
    Capture,
    Render,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    pub device_id: String,
    pub friendly_name: String,
    pub is_default: bool,
    pub direction: DeviceDirection,
}

pub fn enumerate_devices() -> Result<Vec<AudioDeviceInfo>, PlatformError> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_input_name = host.default_input_device().and_then(|d| d.name().ok());
    let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

    if let Ok(inputs) = host.input_devices() {
        for device in inputs {
            if let Ok(name) = device.name() {
                devices.push(AudioDeviceInfo {
                    device_id: name.clone(),
                    is_default: default_input_name.as_deref() == Some(name.as_str()),
                    friendly_name: name,
                    direction: DeviceDirection::Capture,
                });
            }
        }
    }
    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            if let Ok(name) = device.name() {
                devices.push(AudioDeviceInfo {
                    device_id: name.clone(),
                    is_default: default_output_name.as_deref() == Some(name.as_str()),
                    friendly_name: name,
                    direction: DeviceDirection::Render,
                });
            }
        }
    }

    if devices.is_empty() {
        return Err(PlatformError::DeviceNotFound("no devices enumerated".into()));
    }
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info_serialization() {
        let info = AudioDeviceInfo {
            device_id: "abc".into(),
            friendly_name: "Speakers".into(),
            is_default: true,
            direction: DeviceDirection::Render,
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("Speakers"));
    }
}
