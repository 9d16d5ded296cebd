use std::str::FromStr;

use super::error::WriterError;

/// Character encoding applied by `WriteSession::write_text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    Latin1,
    Ascii,
}

/// What to do with a character the encoding cannot represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    #[default]
    Strict,
    Replace,
    Ignore,
    XmlCharRefReplace,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "iso-8859-1",
            Encoding::Ascii => "ascii",
        }
    }

    fn max_code_point(self) -> Option<u32> {
        match self {
            Encoding::Utf8 => None,
            Encoding::Latin1 => Some(0xFF),
            Encoding::Ascii => Some(0x7F),
        }
    }

    /// Encode `text`, appending the bytes to `out`.
    pub fn encode_into(
        self,
        text: &str,
        policy: ErrorPolicy,
        out: &mut Vec<u8>,
    ) -> Result<(), WriterError> {
        let Some(max) = self.max_code_point() else {
            out.extend_from_slice(text.as_bytes());
            return Ok(());
        };

        out.reserve(text.len());
        for (position, ch) in text.chars().enumerate() {
            let code = ch as u32;
            if code <= max {
                out.push(code as u8);
                continue;
            }
            match policy {
                ErrorPolicy::Strict => {
                    return Err(WriterError::Encode {
                        ch,
                        position,
                        encoding: self.name(),
                    })
                }
                ErrorPolicy::Replace => out.push(b'?'),
                ErrorPolicy::Ignore => {}
                ErrorPolicy::XmlCharRefReplace => {
                    out.extend_from_slice(format!("&#{code};").as_bytes())
                }
            }
        }
        Ok(())
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin-1" | "latin1" => Ok(Encoding::Latin1),
            "ascii" | "us-ascii" => Ok(Encoding::Ascii),
            other => Err(format!("unknown encoding '{other}'")),
        }
    }
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(ErrorPolicy::Strict),
            "replace" => Ok(ErrorPolicy::Replace),
            "ignore" => Ok(ErrorPolicy::Ignore),
            "xmlcharrefreplace" => Ok(ErrorPolicy::XmlCharRefReplace),
            other => Err(format!("unknown error policy '{other}'")),
        }
    }
}
