//! ACPI method evaluation through the `acpi_call` kernel module
//!
//! A request is written as one line: the full method path followed by its
//! arguments (`0x..` integers, `{0x..,0x..}` buffers, quoted strings). Reading
//! the file back yields the result in the same notation, `[..]` for packages,
//! or `Error: AE_...` when evaluation failed.

use bbswitch_core::{AcpiEvaluator, AcpiObject, BbswitchError, Result};
use bbswitch_types::AcpiHandle;
use std::fs;
use std::path::{Path, PathBuf};

/// Default location of the `acpi_call` interface
pub const DEFAULT_ACPI_CALL_PATH: &str = "/proc/acpi/call";

/// Evaluator backed by `/proc/acpi/call`
#[derive(Debug, Clone)]
pub struct AcpiCall {
    path: PathBuf,
}

impl AcpiCall {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the `acpi_call` module is loaded
    pub fn is_available(&self) -> bool {
        self.path.exists()
    }
}

impl Default for AcpiCall {
    fn default() -> Self {
        Self::new(DEFAULT_ACPI_CALL_PATH)
    }
}

/// Build the request line for `method` below `handle`
pub fn format_request(handle: &AcpiHandle, method: &str, args: &[AcpiObject]) -> String {
    let mut request = handle.method_path(method);
    for arg in args {
        request.push(' ');
        request.push_str(&arg.to_string());
    }
    request
}

/// Parse the text `acpi_call` returns after an evaluation
pub fn parse_response(text: &str) -> Result<AcpiObject> {
    let text = text.trim_end_matches('\0').trim();

    if let Some(diagnostic) = text.strip_prefix("Error:") {
        return Err(BbswitchError::Firmware(diagnostic.trim().to_string()));
    }
    if text == "not called" {
        return Err(BbswitchError::Firmware("method was not called".to_string()));
    }

    let mut parser = ResponseParser { input: text, pos: 0 };
    let object = parser.object()?;
    parser.skip_whitespace();
    if parser.pos != text.len() {
        return Err(parser.error("trailing characters"));
    }
    Ok(object)
}

struct ResponseParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> ResponseParser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn error(&self, what: &str) -> BbswitchError {
        BbswitchError::Firmware(format!("unparseable acpi_call result ({}): {}", what, self.input))
    }

    fn expect(&mut self, c: char) -> Result<()> {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c)))
        }
    }

    fn object(&mut self) -> Result<AcpiObject> {
        self.skip_whitespace();
        match self.peek() {
            Some('{') => self.buffer(),
            Some('[') => self.package(),
            Some('"') => self.string(),
            Some(c) if c.is_ascii_digit() => self.integer().map(AcpiObject::Integer),
            _ => Err(self.error("unknown object")),
        }
    }

    fn integer(&mut self) -> Result<u64> {
        self.skip_whitespace();
        let rest = self.rest();
        let end = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        let token = &rest[..end];
        let value = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => token.parse::<u64>(),
        }
        .map_err(|_| self.error("bad integer"))?;
        self.pos += end;
        Ok(value)
    }

    fn buffer(&mut self) -> Result<AcpiObject> {
        self.expect('{')?;
        let mut bytes = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(AcpiObject::Buffer(bytes));
            }
            let value = self.integer()?;
            let byte = u8::try_from(value).map_err(|_| self.error("buffer byte out of range"))?;
            bytes.push(byte);
            self.skip_whitespace();
            if self.peek() == Some(',') {
                self.pos += 1;
            }
        }
    }

    fn package(&mut self) -> Result<AcpiObject> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(']') {
                self.pos += 1;
                return Ok(AcpiObject::Package(items));
            }
            items.push(self.object()?);
            self.skip_whitespace();
            if self.peek() == Some(',') {
                self.pos += 1;
            }
        }
    }

    fn string(&mut self) -> Result<AcpiObject> {
        self.expect('"')?;
        let rest = self.rest();
        let end = rest.find('"').ok_or_else(|| self.error("unterminated string"))?;
        let value = rest[..end].to_string();
        self.pos += end + 1;
        Ok(AcpiObject::String(value))
    }
}

impl AcpiEvaluator for AcpiCall {
    fn evaluate(
        &mut self,
        handle: &AcpiHandle,
        method: &str,
        args: &[AcpiObject],
    ) -> Result<AcpiObject> {
        let request = format_request(handle, method, args);
        log::debug!("acpi_call: {}", request);

        fs::write(&self.path, &request).map_err(|e| {
            BbswitchError::Firmware(format!("writing {}: {}", self.path.display(), e))
        })?;
        let response = fs::read_to_string(&self.path).map_err(|e| {
            BbswitchError::Firmware(format!("reading {}: {}", self.path.display(), e))
        })?;
        log::debug!("acpi_call result: {}", response.trim_end_matches('\0').trim());

        parse_response(&response)
    }
}
