//! ACPI object model and evaluation seam

use crate::error::Result;
use bbswitch_types::AcpiHandle;
use std::fmt;

/// An ACPI object passed to or returned from a control method
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcpiObject {
    Integer(u64),
    Buffer(Vec<u8>),
    String(String),
    Package(Vec<AcpiObject>),
}

impl AcpiObject {
    pub fn type_name(&self) -> &'static str {
        match self {
            AcpiObject::Integer(_) => "integer",
            AcpiObject::Buffer(_) => "buffer",
            AcpiObject::String(_) => "string",
            AcpiObject::Package(_) => "package",
        }
    }
}

impl fmt::Display for AcpiObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcpiObject::Integer(value) => write!(f, "{:#x}", value),
            AcpiObject::Buffer(bytes) => {
                f.write_str("{")?;
                for (i, byte) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{:#04x}", byte)?;
                }
                f.write_str("}")
            }
            AcpiObject::String(s) => write!(f, "\"{}\"", s),
            AcpiObject::Package(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Evaluates control methods in the firmware namespace
///
/// A failed evaluation is reported as [`crate::BbswitchError::Firmware`]
/// carrying the firmware's diagnostic.
pub trait AcpiEvaluator {
    fn evaluate(
        &mut self,
        handle: &AcpiHandle,
        method: &str,
        args: &[AcpiObject],
    ) -> Result<AcpiObject>;
}

impl<T: AcpiEvaluator + ?Sized> AcpiEvaluator for Box<T> {
    fn evaluate(
        &mut self,
        handle: &AcpiHandle,
        method: &str,
        args: &[AcpiObject],
    ) -> Result<AcpiObject> {
        (**self).evaluate(handle, method, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_acpi_call_syntax() {
        assert_eq!(AcpiObject::Integer(0x100).to_string(), "0x100");
        assert_eq!(AcpiObject::Buffer(vec![1, 0, 0, 3]).to_string(), "{0x01,0x00,0x00,0x03}");
        assert_eq!(AcpiObject::String("abc".into()).to_string(), "\"abc\"");
        assert_eq!(
            AcpiObject::Package(vec![AcpiObject::Integer(1), AcpiObject::Integer(2)]).to_string(),
            "[0x1,0x2]"
        );
    }
}
