//! `Slidedat.ini`, the MRXS slide description.
//!
//! A plain INI file, usually UTF-8 with a byte order mark and CRLF line
//! endings. The model keeps sections and keys in file order so a rewrite
//! only differs from the original where we changed something.

use crate::error::FormatError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One `[section]` and its keys, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

impl Section {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

/// Parsed `Slidedat.ini`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slidedat {
    has_bom: bool,
    sections: Vec<Section>,
}

impl Slidedat {
    /// Parse the raw file contents.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let (has_bom, body) = match bytes.strip_prefix(UTF8_BOM) {
            Some(rest) => (true, rest),
            None => (false, bytes),
        };
        let text = std::str::from_utf8(body)
            .map_err(|e| FormatError::mrxs(format!("Slidedat.ini is not UTF-8: {}", e)))?;

        let mut sections: Vec<Section> = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                sections.push(Section::new(name.trim()));
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(FormatError::mrxs(format!(
                    "Slidedat.ini line {}: expected key = value",
                    number + 1
                )));
            };
            let section = sections.last_mut().ok_or_else(|| {
                FormatError::mrxs(format!(
                    "Slidedat.ini line {}: key outside of any section",
                    number + 1
                ))
            })?;
            section
                .entries
                .push((key.trim().to_string(), value.trim().to_string()));
        }

        Ok(Self { has_bom, sections })
    }

    /// Serialize with `key = value` lines, a blank line after each section,
    /// CRLF line endings, and the original byte order mark.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut text = String::new();
        for section in &self.sections {
            text.push('[');
            text.push_str(&section.name);
            text.push_str("]\r\n");
            for (key, value) in &section.entries {
                text.push_str(key);
                text.push_str(" = ");
                text.push_str(value);
                text.push_str("\r\n");
            }
            text.push_str("\r\n");
        }

        let mut out = Vec::with_capacity(text.len() + UTF8_BOM.len());
        if self.has_bom {
            out.extend_from_slice(UTF8_BOM);
        }
        out.extend_from_slice(text.as_bytes());
        out
    }

    pub fn has_bom(&self) -> bool {
        self.has_bom
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.section(name).is_some()
    }

    fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.name == name)
    }

    /// Value of `key` in `section`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        let section = self.section(section)?;
        section
            .position(key)
            .map(|i| section.entries[i].1.as_str())
    }

    /// Value of a key that must be present.
    pub fn require(&self, section: &str, key: &str) -> Result<&str, FormatError> {
        self.get(section, key)
            .ok_or_else(|| FormatError::mrxs(format!("missing [{}] {}", section, key)))
    }

    /// Non-negative integer value of a key that must be present.
    pub fn require_count(&self, section: &str, key: &str) -> Result<usize, FormatError> {
        let value = self.require(section, key)?;
        value.parse().map_err(|_| {
            FormatError::mrxs(format!(
                "[{}] {} is not a count: {:?}",
                section, key, value
            ))
        })
    }

    /// Keys of `section`, in file order.
    pub fn keys(&self, section: &str) -> Vec<String> {
        self.section(section)
            .map(|s| s.entries.iter().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default()
    }

    /// Set a key, replacing its value in place or appending it.
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        let value = value.into();
        if self.section_mut(section).is_none() {
            self.sections.push(Section::new(section));
        }
        if let Some(section) = self.section_mut(section) {
            match section.position(key) {
                Some(i) => section.entries[i].1 = value,
                None => section.entries.push((key.to_string(), value)),
            }
        }
    }

    /// Remove a key, returning its value.
    pub fn remove_key(&mut self, section: &str, key: &str) -> Option<String> {
        let section = self.section_mut(section)?;
        let index = section.position(key)?;
        Some(section.entries.remove(index).1)
    }

    /// Rename a key in place, keeping its position.
    pub fn rename_key(&mut self, section: &str, old: &str, new: &str) -> bool {
        let Some(section) = self.section_mut(section) else {
            return false;
        };
        match section.position(old) {
            Some(i) => {
                section.entries[i].0 = new.to_string();
                true
            }
            None => false,
        }
    }

    /// Remove a whole section.
    pub fn remove_section(&mut self, name: &str) -> bool {
        let before = self.sections.len();
        self.sections.retain(|s| s.name != name);
        self.sections.len() != before
    }

    /// Rename a section in place.
    pub fn rename_section(&mut self, old: &str, new: &str) -> bool {
        match self.section_mut(old) {
            Some(section) => {
                section.name = new.to_string();
                true
            }
            None => false,
        }
    }
}
