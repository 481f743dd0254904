//! Reading launchd property lists.
//!
//! Only the subset of the XML plist format the agent definition uses is
//! understood: dictionaries, arrays, strings, integers and booleans. Any
//! other element is kept as [`PlistValue::Other`] so unknown keys never make
//! the document unreadable.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{AutoupdateError, AutoupdateResult, DefinitionErrorKind};

/// Key holding the periodic interval in seconds.
pub const START_INTERVAL_KEY: &str = "StartInterval";

/// Key holding the run-at-load flag.
pub const RUN_AT_LOAD_KEY: &str = "RunAtLoad";

/// A value in a property list.
#[derive(Debug, Clone, PartialEq)]
pub enum PlistValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Array(Vec<PlistValue>),
    Dict(BTreeMap<String, PlistValue>),
    /// Element type this reader does not interpret (`<real>`, `<date>`, ...).
    Other(String),
}

/// Top-level dictionary of an installed agent definition.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDefinition {
    entries: BTreeMap<String, PlistValue>,
}

impl AgentDefinition {
    /// Read and parse the property list at `path`.
    pub fn read(path: &Path) -> AutoupdateResult<Self> {
        let xml = std::fs::read_to_string(path)?;
        Self::parse(&xml, path)
    }

    /// Parse property list XML. `path` is only used in error messages.
    pub fn parse(xml: &str, path: &Path) -> AutoupdateResult<Self> {
        let tokens = tokenize(xml, path)?;

        let start = tokens
            .iter()
            .position(|t| matches!(t, Token::Open(n) | Token::Empty(n) if n == "dict"))
            .ok_or_else(|| AutoupdateError::Definition {
                kind: DefinitionErrorKind::MissingDict {
                    path: path.to_path_buf(),
                },
            })?;

        if matches!(&tokens[start], Token::Empty(_)) {
            return Ok(Self {
                entries: BTreeMap::new(),
            });
        }

        let mut parser = Parser {
            tokens: &tokens,
            pos: start + 1,
            path,
        };
        let entries = parser.parse_dict()?;

        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&PlistValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn label(&self) -> Option<&str> {
        match self.get("Label") {
            Some(PlistValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// `StartInterval` in seconds, if present as an integer.
    pub fn start_interval(&self) -> Option<i64> {
        match self.get(START_INTERVAL_KEY) {
            Some(PlistValue::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    /// `RunAtLoad`, if present as a boolean.
    pub fn run_at_load(&self) -> Option<bool> {
        match self.get(RUN_AT_LOAD_KEY) {
            Some(PlistValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum Token {
    Open(String),
    Close(String),
    Empty(String),
    Text(String),
}

fn tokenize(xml: &str, path: &Path) -> AutoupdateResult<Vec<Token>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut tokens = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => tokens.push(Token::Open(tag_name(e.name().as_ref()))),
            Ok(Event::End(e)) => tokens.push(Token::Close(tag_name(e.name().as_ref()))),
            Ok(Event::Empty(e)) => tokens.push(Token::Empty(tag_name(e.name().as_ref()))),
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(|e| malformed(path, e))?;
                tokens.push(Token::Text(text.into_owned()));
            }
            Ok(Event::CData(c)) => {
                tokens.push(Token::Text(String::from_utf8_lossy(&c.into_inner()).into_owned()))
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(path, e)),
        }
    }

    Ok(tokens)
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn malformed(path: &Path, message: impl Display) -> AutoupdateError {
    AutoupdateError::Definition {
        kind: DefinitionErrorKind::Malformed {
            path: PathBuf::from(path),
            message: message.to_string(),
        },
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    path: &'a Path,
}

impl<'a> Parser<'a> {
    fn next(&mut self) -> AutoupdateResult<&'a Token> {
        let token = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| malformed(self.path, "unexpected end of document"))?;
        self.pos += 1;
        Ok(token)
    }

    fn unexpected(&self, token: &Token, context: &str) -> AutoupdateError {
        malformed(self.path, format!("unexpected {:?} in {}", token, context))
    }

    /// Parse dictionary entries; the opening `<dict>` is already consumed.
    fn parse_dict(&mut self) -> AutoupdateResult<BTreeMap<String, PlistValue>> {
        let mut entries = BTreeMap::new();
        loop {
            let key = match self.next()? {
                Token::Close(tag) if tag == "dict" => return Ok(entries),
                Token::Open(tag) if tag == "key" => self.text_until_close("key")?,
                Token::Empty(tag) if tag == "key" => String::new(),
                other => return Err(self.unexpected(other, "<dict>")),
            };
            let value = self.parse_value()?;
            entries.insert(key, value);
        }
    }

    fn parse_value(&mut self) -> AutoupdateResult<PlistValue> {
        let value = match self.next()? {
            Token::Empty(tag) => match tag.as_str() {
                "true" => PlistValue::Boolean(true),
                "false" => PlistValue::Boolean(false),
                "string" => PlistValue::String(String::new()),
                "array" => PlistValue::Array(Vec::new()),
                "dict" => PlistValue::Dict(BTreeMap::new()),
                other => PlistValue::Other(other.to_string()),
            },
            Token::Open(tag) => match tag.as_str() {
                "string" => PlistValue::String(self.text_until_close("string")?),
                "integer" => {
                    let text = self.text_until_close("integer")?;
                    let n = text
                        .trim()
                        .parse::<i64>()
                        .map_err(|e| malformed(self.path, format!("bad integer '{}': {}", text, e)))?;
                    PlistValue::Integer(n)
                }
                "true" | "false" => {
                    self.text_until_close(tag)?;
                    PlistValue::Boolean(tag == "true")
                }
                "array" => {
                    let mut items = Vec::new();
                    loop {
                        match self.tokens.get(self.pos) {
                            Some(Token::Close(t)) if t == "array" => {
                                self.pos += 1;
                                break;
                            }
                            Some(_) => items.push(self.parse_value()?),
                            None => return Err(malformed(self.path, "unterminated <array>")),
                        }
                    }
                    PlistValue::Array(items)
                }
                "dict" => PlistValue::Dict(self.parse_dict()?),
                other => {
                    self.skip_element()?;
                    PlistValue::Other(other.to_string())
                }
            },
            other => return Err(self.unexpected(other, "value position")),
        };
        Ok(value)
    }

    /// Read the optional text of a simple element and its closing tag.
    fn text_until_close(&mut self, tag: &str) -> AutoupdateResult<String> {
        let text = match self.next()? {
            Token::Close(t) if t == tag => return Ok(String::new()),
            Token::Text(text) => text.clone(),
            other => return Err(self.unexpected(other, tag)),
        };
        match self.next()? {
            Token::Close(t) if t == tag => Ok(text),
            other => Err(self.unexpected(other, tag)),
        }
    }

    /// Skip to the end of an element whose opening tag is already consumed.
    fn skip_element(&mut self) -> AutoupdateResult<()> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.next()? {
                Token::Open(_) => depth += 1,
                Token::Close(_) => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>Label</key>
  <string>com.github.domt4.homebrew-autoupdate</string>
  <key>ProgramArguments</key>
  <array>
      <string>/tmp/updater</string>
  </array>
  <key>RunAtLoad</key>
  <true/>
  <key>StartInterval</key>
  <integer>86400</integer>
</dict>
</plist>
"#;

    fn parse(xml: &str) -> AutoupdateResult<AgentDefinition> {
        AgentDefinition::parse(xml, Path::new("test.plist"))
    }

    #[test]
    fn test_parse_agent() {
        let def = parse(AGENT).unwrap();
        assert_eq!(def.label(), Some("com.github.domt4.homebrew-autoupdate"));
        assert_eq!(def.start_interval(), Some(86400));
        assert_eq!(def.run_at_load(), Some(true));
        assert_eq!(
            def.get("ProgramArguments"),
            Some(&PlistValue::Array(vec![PlistValue::String("/tmp/updater".to_string())]))
        );
    }

    #[test]
    fn test_calendar_interval_has_no_start_interval() {
        let xml = r#"<plist><dict>
            <key>StartCalendarInterval</key>
            <dict><key>Hour</key><integer>3</integer></dict>
            <key>RunAtLoad</key><false/>
        </dict></plist>"#;
        let def = parse(xml).unwrap();
        assert_eq!(def.start_interval(), None);
        assert!(def.contains_key("StartCalendarInterval"));
        assert_eq!(def.run_at_load(), Some(false));
    }

    #[test]
    fn test_unknown_elements_are_kept() {
        let xml = r#"<plist><dict>
            <key>Nice</key><real>1.5</real>
            <key>StartInterval</key><integer>3600</integer>
        </dict></plist>"#;
        let def = parse(xml).unwrap();
        assert_eq!(def.get("Nice"), Some(&PlistValue::Other("real".to_string())));
        assert_eq!(def.start_interval(), Some(3600));
    }

    #[test]
    fn test_escaped_text() {
        let xml = "<plist><dict><key>Program</key><string>/tmp/R&amp;D/updater</string></dict></plist>";
        let def = parse(xml).unwrap();
        assert_eq!(
            def.get("Program"),
            Some(&PlistValue::String("/tmp/R&D/updater".to_string()))
        );
    }

    #[test]
    fn test_missing_dict() {
        let result = parse("<plist><array/></plist>");
        assert!(matches!(
            result,
            Err(AutoupdateError::Definition {
                kind: DefinitionErrorKind::MissingDict { .. }
            })
        ));
    }

    #[test]
    fn test_truncated_document() {
        let result = parse("<plist><dict><key>Label</key><string>x</string>");
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_integer() {
        let result = parse("<plist><dict><key>StartInterval</key><integer>daily</integer></dict></plist>");
        assert!(matches!(
            result,
            Err(AutoupdateError::Definition {
                kind: DefinitionErrorKind::Malformed { .. }
            })
        ));
    }

    #[test]
    fn test_empty_dict() {
        let def = parse("<plist><dict/></plist>").unwrap();
        assert_eq!(def.start_interval(), None);
    }
}
