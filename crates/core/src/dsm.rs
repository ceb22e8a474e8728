//! Optimus `_DSM` firmware method invocation
//!
//! The call takes four arguments: the Optimus GUID as a 16-byte buffer, the
//! revision, the function code and a 4-byte argument buffer. The answer is
//! either a 4-byte little-endian result buffer or the integer
//! [`DSM_FUNCTION_NOT_FOUND`] when the firmware has no such function.

use crate::acpi::{AcpiEvaluator, AcpiObject};
use crate::error::{BbswitchError, Result};
use bbswitch_types::AcpiHandle;
use uuid::Uuid;

/// GUID identifying the Optimus power-control method family
pub const OPTIMUS_DSM_GUID: Uuid = Uuid::from_u128(0xa486d8f8_0bda_471b_a72b_6042a6b5bee0);

/// Method revision passed as the second argument
pub const OPTIMUS_DSM_REVISION: u64 = 0x0000_0100;

/// Integer answer meaning the requested function does not exist
pub const DSM_FUNCTION_NOT_FOUND: u64 = 0x8000_0002;

/// Power-control function code
pub const OPTIMUS_FUNC_POWER_CONTROL: u32 = 0x1A;

/// Argument buffer requesting the card be powered down
pub const OPTIMUS_ARGS_POWER_OFF: [u8; 4] = [1, 0, 0, 3];

const DSM_METHOD: &str = "_DSM";

/// The GUID in the mixed-endian layout ACPI buffers carry
pub fn optimus_guid_bytes() -> [u8; 16] {
    OPTIMUS_DSM_GUID.to_bytes_le()
}

/// Build the four `_DSM` arguments
pub fn dsm_arguments(function: u32, args: [u8; 4]) -> Vec<AcpiObject> {
    vec![
        AcpiObject::Buffer(optimus_guid_bytes().to_vec()),
        AcpiObject::Integer(OPTIMUS_DSM_REVISION),
        AcpiObject::Integer(function as u64),
        AcpiObject::Buffer(args.to_vec()),
    ]
}

/// Interpret the object returned by `_DSM`
pub fn decode_response(response: &AcpiObject) -> Result<u32> {
    match response {
        AcpiObject::Integer(DSM_FUNCTION_NOT_FOUND) => {
            log::info!("Optimus function not found");
            Err(BbswitchError::NotSupported)
        }
        AcpiObject::Buffer(bytes) if bytes.len() == 4 => {
            Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
        other => Err(BbswitchError::Firmware(format!(
            "unexpected _DSM result: {} {}",
            other.type_name(),
            other
        ))),
    }
}

/// Evaluate the Optimus `_DSM` against `handle`
///
/// Single attempt; any failure aborts the caller's transition.
pub fn invoke<F>(firmware: &mut F, handle: &AcpiHandle, function: u32, args: [u8; 4]) -> Result<u32>
where
    F: AcpiEvaluator + ?Sized,
{
    let response = firmware
        .evaluate(handle, DSM_METHOD, &dsm_arguments(function, args))
        .map_err(|e| {
            log::warn!("failed to evaluate _DSM: {}", e);
            e
        })?;

    decode_response(&response)
}

/// Ask the firmware to cut power to the card
pub fn power_off<F>(firmware: &mut F, handle: &AcpiHandle) -> Result<u32>
where
    F: AcpiEvaluator + ?Sized,
{
    let result = invoke(firmware, handle, OPTIMUS_FUNC_POWER_CONTROL, OPTIMUS_ARGS_POWER_OFF)?;
    log::info!("Result of _DSM call: {:08X}", result);
    Ok(result)
}

/// Counterpart of [`power_off`]
///
/// The Optimus method family has no enable function; power returns through
/// the bus D0 transition alone, so this always succeeds.
pub fn power_on<F>(_firmware: &mut F, _handle: &AcpiHandle) -> Result<()>
where
    F: AcpiEvaluator + ?Sized,
{
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeFirmware;

    #[test]
    fn test_guid_byte_layout() {
        assert_eq!(
            optimus_guid_bytes(),
            [
                0xF8, 0xD8, 0x86, 0xA4, 0xDA, 0x0B, 0x1B, 0x47, 0xA7, 0x2B, 0x60, 0x42, 0xA6, 0xB5,
                0xBE, 0xE0,
            ]
        );
    }

    #[test]
    fn test_arguments_shape() {
        let args = dsm_arguments(0x1A, [1, 0, 0, 3]);
        assert_eq!(args.len(), 4);
        assert_eq!(args[1], AcpiObject::Integer(0x100));
        assert_eq!(args[2], AcpiObject::Integer(0x1A));
        assert_eq!(args[3], AcpiObject::Buffer(vec![1, 0, 0, 3]));
    }

    #[test]
    fn test_decode_little_endian_buffer() {
        assert_eq!(decode_response(&AcpiObject::Buffer(vec![0x01, 0, 0, 0])).unwrap(), 1);
        assert_eq!(
            decode_response(&AcpiObject::Buffer(vec![0xFF; 4])).unwrap(),
            4_294_967_295
        );
        assert_eq!(
            decode_response(&AcpiObject::Buffer(vec![0x78, 0x56, 0x34, 0x12])).unwrap(),
            0x1234_5678
        );
    }

    #[test]
    fn test_decode_not_found_sentinel() {
        let err = decode_response(&AcpiObject::Integer(0x8000_0002)).unwrap_err();
        assert!(matches!(err, BbswitchError::NotSupported));
    }

    #[test]
    fn test_decode_other_shapes_fail() {
        for response in [
            AcpiObject::Integer(0),
            AcpiObject::Buffer(vec![1, 2, 3]),
            AcpiObject::String("x".into()),
            AcpiObject::Package(vec![]),
        ] {
            let err = decode_response(&response).unwrap_err();
            assert!(matches!(err, BbswitchError::Firmware(_)), "{:?}", response);
        }
    }

    #[test]
    fn test_invoke_targets_dsm_method() {
        let mut firmware = FakeFirmware::answering(AcpiObject::Buffer(vec![0x59, 0, 0, 0]));
        let handle = AcpiHandle::new("\\_SB_.PCI0.PEG0.PEGP");

        let result = power_off(&mut firmware, &handle).unwrap();

        assert_eq!(result, 0x59);
        assert_eq!(firmware.calls.len(), 1);
        let call = &firmware.calls[0];
        assert_eq!(call.handle, handle);
        assert_eq!(call.method, "_DSM");
        assert_eq!(call.args, dsm_arguments(0x1A, [1, 0, 0, 3]));
    }

    #[test]
    fn test_invoke_propagates_evaluation_failure() {
        let mut firmware = FakeFirmware::failing("AE_NOT_FOUND");
        let handle = AcpiHandle::new("\\_SB_.PCI0.PEG0.PEGP");
        let err = power_off(&mut firmware, &handle).unwrap_err();
        assert!(matches!(err, BbswitchError::Firmware(_)));
    }

    #[test]
    fn test_power_on_never_calls_firmware() {
        let mut firmware = FakeFirmware::failing("AE_NOT_FOUND");
        let handle = AcpiHandle::new("\\_SB_.PCI0.PEG0.PEGP");
        assert!(power_on(&mut firmware, &handle).is_ok());
        assert!(firmware.calls.is_empty());
    }
}
