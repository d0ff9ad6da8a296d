use std::fmt;

/// Quote an identifier for interpolation into PostgreSQL text.
///
/// Embedded double quotes are doubled and the whole name is wrapped in
/// double quotes, so any input string is a single identifier token. The
/// identifier is not checked for existence.
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// A table or column name that can only be rendered quoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    /// The unquoted name as declared.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&quote(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_plain_identifier() {
        assert_eq!(quote("pages"), "\"pages\"");
        assert_eq!(quote("Mixed Case"), "\"Mixed Case\"");
    }

    #[test]
    fn test_quote_doubles_embedded_quotes() {
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(
            quote("x\"; DROP TABLE users; --"),
            "\"x\"\"; DROP TABLE users; --\""
        );
    }

    #[test]
    fn test_ident_display() {
        let ident = Ident::new("left_id");
        assert_eq!(ident.to_string(), "\"left_id\"");
        assert_eq!(ident.name(), "left_id");
    }
}
