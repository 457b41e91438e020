//! Output device enumeration through cpal

use cpal::traits::{DeviceTrait, HostTrait};

use super::DeviceInfo;
use crate::error::AudioError;

/// All output devices of the default host, in host order
///
/// The position in this list is the device id used on the wire.
pub fn output_devices() -> Result<Vec<cpal::Device>, AudioError> {
    let host = cpal::default_host();
    host.output_devices()
        .map(|iter| iter.collect())
        .map_err(|e| AudioError::DeviceNotFound(e.to_string()))
}

/// Describe every output device
pub fn list_output_devices() -> Result<Vec<DeviceInfo>, AudioError> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    for (index, device) in output_devices()?.into_iter().enumerate() {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let is_default = default_name.as_ref() == Some(&name);

        devices.push(DeviceInfo {
            id: index as u32,
            max_output_channels: max_output_channels(&device),
            name,
            is_default,
        });
    }

    Ok(devices)
}

/// Largest channel count any supported output config offers
pub fn max_output_channels(device: &cpal::Device) -> u16 {
    let from_ranges = device
        .supported_output_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);

    if from_ranges > 0 {
        return from_ranges;
    }
    device
        .default_output_config()
        .map(|c| c.channels())
        .unwrap_or(0)
}

/// Resolve a wire device id (or the host default) to a cpal device
pub fn get_output_device(device_id: Option<u32>) -> Result<cpal::Device, AudioError> {
    match device_id {
        Some(id) => output_devices()?
            .into_iter()
            .nth(id as usize)
            .ok_or_else(|| AudioError::DeviceNotFound(id.to_string())),
        None => cpal::default_host()
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string())),
    }
}
