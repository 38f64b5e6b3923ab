use core::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one workbook/document instance ("unit").
///
/// Hosts assign these; the engine treats them as opaque strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

/// Identifier of one sheet/tab within a unit.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(UnitId);
string_id!(SheetId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_transparent_strings() {
        let unit = UnitId::from("workbook-01");
        assert_eq!(unit.as_str(), "workbook-01");
        assert_eq!(unit.to_string(), "workbook-01");
        assert_eq!(serde_json::to_string(&unit).unwrap(), "\"workbook-01\"");

        let sheet: SheetId = serde_json::from_str("\"sheet-1\"").unwrap();
        assert_eq!(sheet, SheetId::new("sheet-1"));
    }
}
