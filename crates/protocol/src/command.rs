//! Validated builders for every LCS request the gateway issues.
//!
//! All builders are pure: they validate their arguments, then assemble a
//! [`Frame`], with no I/O. Out-of-range values fail with
//! [`ProtocolError::InvalidArgument`] before any encoding happens, so a
//! bad REST call can never reach the wire.

use crate::constants::{MAX_LAMP_NO, MAX_LEVEL};
use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::types::DeviceType;

/// Query lamp brightness levels (OP 0x96 0x00). Addressable to RCUs as
/// well as the LCS master, hence the explicit device type.
pub const OP_GET_BRIGHTNESS: (u8, u8) = (0x96, 0x00);

/// Query color-temperature levels (OP 0x96 0x06).
pub const OP_GET_COLOR_TEMP: (u8, u8) = (0x96, 0x06);

/// Dim a single lamp (OP 0x92 0x00).
pub const OP_CONTROL_LAMP: (u8, u8) = (0x92, 0x00);

/// Set brightness on a list of lamps (OP 0x90 0x00).
pub const OP_BLOCK_CONTROL: (u8, u8) = (0x90, 0x00);

/// Set color temperature on a list of lamps (OP 0x90 0x05).
pub const OP_BLOCK_COLOR_TEMP: (u8, u8) = (0x90, 0x05);

/// Recall a scene preset (OP 0x91 0x00).
pub const OP_EXECUTE_SCENE: (u8, u8) = (0x91, 0x00);

/// Set every lamp on a CU at once (OP 0x90 0x02).
pub const OP_ALL_LAMPS: (u8, u8) = (0x90, 0x02);

/// Broadcast device-name query (OP 0xA2 0x05, master = CU = 0).
pub const OP_GET_DEVICE_NAME: (u8, u8) = (0xA2, 0x05);

/// Requests the per-lamp brightness table from a device.
pub fn get_lamp_brightness(
    device_type: DeviceType,
    master: u8,
    cu: u8,
) -> Result<Frame, ProtocolError> {
    check_addr(master, cu)?;
    let (op1, op2) = OP_GET_BRIGHTNESS;
    Ok(Frame::request(device_type.as_byte(), master, cu, op1, op2, Vec::new()))
}

/// Requests the per-lamp color-temperature table.
pub fn get_color_temperature(master: u8, cu: u8) -> Result<Frame, ProtocolError> {
    check_addr(master, cu)?;
    let (op1, op2) = OP_GET_COLOR_TEMP;
    Ok(Frame::request(
        DeviceType::Lcs.as_byte(),
        master,
        cu,
        op1,
        op2,
        Vec::new(),
    ))
}

/// Dims one lamp to the given brightness.
pub fn control_lamp(
    master: u8,
    cu: u8,
    lamp_no: u8,
    brightness: u8,
) -> Result<Frame, ProtocolError> {
    check_addr(master, cu)?;
    check_lamp_no(lamp_no)?;
    check_level("brightness", brightness)?;
    let (op1, op2) = OP_CONTROL_LAMP;
    Ok(Frame::request(
        DeviceType::Lcs.as_byte(),
        master,
        cu,
        op1,
        op2,
        vec![cu, lamp_no, 0x00, brightness],
    ))
}

/// Sets one brightness on a list of lamps in a single command.
pub fn block_control(
    master: u8,
    cu: u8,
    lamps: &[u8],
    brightness: u8,
) -> Result<Frame, ProtocolError> {
    check_addr(master, cu)?;
    check_lamp_list(lamps)?;
    check_level("brightness", brightness)?;
    let (op1, op2) = OP_BLOCK_CONTROL;
    Ok(Frame::request(
        DeviceType::Lcs.as_byte(),
        master,
        cu,
        op1,
        op2,
        block_data(cu, lamps, brightness),
    ))
}

/// Sets one color temperature on a list of lamps.
pub fn block_color_temperature(
    master: u8,
    cu: u8,
    lamps: &[u8],
    color_temp: u8,
) -> Result<Frame, ProtocolError> {
    check_addr(master, cu)?;
    check_lamp_list(lamps)?;
    check_level("colorTemp", color_temp)?;
    let (op1, op2) = OP_BLOCK_COLOR_TEMP;
    Ok(Frame::request(
        DeviceType::Lcs.as_byte(),
        master,
        cu,
        op1,
        op2,
        block_data(cu, lamps, color_temp),
    ))
}

/// Recalls a scene preset, optionally faded in over `fade_time`.
pub fn execute_scene(
    master: u8,
    cu: u8,
    scene_no: u8,
    fade_time: u8,
) -> Result<Frame, ProtocolError> {
    check_addr(master, cu)?;
    let (op1, op2) = OP_EXECUTE_SCENE;
    Ok(Frame::request(
        DeviceType::Lcs.as_byte(),
        master,
        cu,
        op1,
        op2,
        vec![cu, scene_no, fade_time],
    ))
}

/// Sets every lamp on the CU to the same brightness.
pub fn control_all_lamps(master: u8, cu: u8, brightness: u8) -> Result<Frame, ProtocolError> {
    check_addr(master, cu)?;
    check_level("brightness", brightness)?;
    let (op1, op2) = OP_ALL_LAMPS;
    Ok(Frame::request(
        DeviceType::Lcs.as_byte(),
        master,
        cu,
        op1,
        op2,
        vec![cu, brightness],
    ))
}

/// Broadcast query for the device name. The only request addressed to
/// master 0 / CU 0.
pub fn get_device_name() -> Frame {
    let (op1, op2) = OP_GET_DEVICE_NAME;
    Frame::request(DeviceType::Lcs.as_byte(), 0x00, 0x00, op1, op2, Vec::new())
}

fn block_data(cu: u8, lamps: &[u8], level: u8) -> Vec<u8> {
    let mut data = Vec::with_capacity(2 + lamps.len() + 1);
    data.push(cu);
    data.push(lamps.len() as u8);
    data.extend_from_slice(lamps);
    data.push(level);
    data
}

fn check_addr(master: u8, cu: u8) -> Result<(), ProtocolError> {
    if master == 0 {
        return Err(ProtocolError::InvalidArgument(
            "master must be in 1..=255".into(),
        ));
    }
    if cu == 0 {
        return Err(ProtocolError::InvalidArgument("cu must be in 1..=255".into()));
    }
    Ok(())
}

fn check_lamp_no(lamp_no: u8) -> Result<(), ProtocolError> {
    if !(1..=MAX_LAMP_NO).contains(&lamp_no) {
        return Err(ProtocolError::InvalidArgument(format!(
            "lampNo {lamp_no} out of range 1..={MAX_LAMP_NO}"
        )));
    }
    Ok(())
}

fn check_lamp_list(lamps: &[u8]) -> Result<(), ProtocolError> {
    if lamps.is_empty() {
        return Err(ProtocolError::InvalidArgument("lampList is empty".into()));
    }
    if lamps.len() > usize::from(MAX_LAMP_NO) {
        return Err(ProtocolError::InvalidArgument(format!(
            "lampList has {} entries, max {MAX_LAMP_NO}",
            lamps.len()
        )));
    }
    for &lamp in lamps {
        check_lamp_no(lamp)?;
    }
    Ok(())
}

fn check_level(name: &str, value: u8) -> Result<(), ProtocolError> {
    if value > MAX_LEVEL {
        return Err(ProtocolError::InvalidArgument(format!(
            "{name} {value} out of range 0..={MAX_LEVEL}"
        )));
    }
    Ok(())
}
