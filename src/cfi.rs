//! DWARF CFI rule sets as carried by `STACK CFI` records.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::mem::take;

use crate::Error;
use crate::Result;


/// A set of rules for recovering the caller's registers at a given
/// instruction.
///
/// Each rule is a program in the unwinder's postfix expression
/// language, kept verbatim; evaluating the programs is the stack
/// walker's business. A rule set is built from a `STACK CFI INIT`
/// record's rule string and then refined by the delta records covering
/// the queried address.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CfiFrameInfo {
    /// The rule computing the canonical frame address, `.cfa`.
    ///
    /// Empty if no rule has been set.
    pub cfa_rule: String,
    /// The rule computing the return address, `.ra`.
    ///
    /// Empty if no rule has been set.
    pub ra_rule: String,
    /// Recovery rules for named registers.
    pub register_rules: BTreeMap<String, String>,
}

impl CfiFrameInfo {
    /// Apply the rules from `rule_set` to this rule set, overriding
    /// rules for registers named in it and keeping all others.
    ///
    /// A rule string is a sequence of `name: expression` pairs, where
    /// the expression extends up to the next `name:` token:
    ///
    /// ```text
    /// .cfa: $rsp 8 + .ra: .cfa -8 + ^ $rbp: .cfa -16 + ^
    /// ```
    pub fn parse_rules(&mut self, rule_set: &str) -> Result<()> {
        let mut name: Option<&str> = None;
        let mut expression = String::new();

        for token in rule_set.split_ascii_whitespace() {
            match token.strip_suffix(':') {
                Some(register) => {
                    if register.is_empty() {
                        return Err(Error::with_invalid_input("empty register name in rule set"))
                    }
                    match name.take() {
                        Some(name) => {
                            if expression.is_empty() {
                                return Err(Error::with_invalid_input(
                                    "register rule without an expression",
                                ))
                            }
                            let () = self.set_rule(name, take(&mut expression));
                        }
                        None => {
                            if !expression.is_empty() {
                                return Err(Error::with_invalid_input(
                                    "expression precedes the first register name",
                                ))
                            }
                        }
                    }
                    name = Some(register);
                }
                _ => {
                    if !expression.is_empty() {
                        let () = expression.push(' ');
                    }
                    let () = expression.push_str(token);
                }
            }
        }

        match name {
            Some(name) if !expression.is_empty() => {
                let () = self.set_rule(name, expression);
                Ok(())
            }
            _ => Err(Error::with_invalid_input(
                "rule set ends without a complete rule",
            )),
        }
    }

    fn set_rule(&mut self, name: &str, expression: String) {
        match name {
            ".cfa" => self.cfa_rule = expression,
            ".ra" => self.ra_rule = expression,
            _ => {
                let _prev = self.register_rules.insert(name.to_string(), expression);
            }
        }
    }
}

impl Display for CfiFrameInfo {
    /// Render the rule set in the `STACK CFI` text form. Parsing the
    /// result reproduces the rule set.
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut sep = "";
        if !self.cfa_rule.is_empty() {
            write!(f, ".cfa: {}", self.cfa_rule)?;
            sep = " ";
        }
        if !self.ra_rule.is_empty() {
            write!(f, "{sep}.ra: {}", self.ra_rule)?;
            sep = " ";
        }
        for (register, rule) in &self.register_rules {
            write!(f, "{sep}{register}: {rule}")?;
            sep = " ";
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use crate::ErrorKind;


    /// Parse a representative rule string and check the resulting rule
    /// set.
    #[test]
    fn parse_rule_set() {
        let mut rules = CfiFrameInfo::default();
        let () = rules
            .parse_rules(".cfa: $rsp 8 + .ra: .cfa -8 + ^ $rbp: .cfa -16 + ^")
            .unwrap();
        assert_eq!(rules.cfa_rule, "$rsp 8 +");
        assert_eq!(rules.ra_rule, ".cfa -8 + ^");
        assert_eq!(rules.register_rules["$rbp"], ".cfa -16 + ^");
    }

    /// Later rules override earlier ones for the same register and
    /// leave the rest alone.
    #[test]
    fn rule_overriding() {
        let mut rules = CfiFrameInfo::default();
        let () = rules.parse_rules(".cfa: $rsp 8 + $rbx: $rbx").unwrap();
        let () = rules.parse_rules(".cfa: $rsp 16 +").unwrap();
        assert_eq!(rules.cfa_rule, "$rsp 16 +");
        assert_eq!(rules.register_rules["$rbx"], "$rbx");
    }

    /// Malformed rule strings are rejected.
    #[test]
    fn parse_errors() {
        let inputs = [
            "",
            "   ",
            ".cfa:",
            "$rsp 8 +",
            "8 + .cfa: $rsp",
            ".cfa: $rsp 8 + .ra:",
            ": $rsp",
        ];
        for input in inputs {
            let mut rules = CfiFrameInfo::default();
            let err = rules.parse_rules(input).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "{input}");
        }
    }

    /// Serializing a rule set and parsing the result must reproduce
    /// the original.
    #[test]
    fn serialization_round_trip() {
        let mut rules = CfiFrameInfo::default();
        let () = rules
            .parse_rules(".cfa: $rsp 8 + .ra: .cfa -8 + ^ $rbp: .cfa -16 + ^ $rbx: $rbx")
            .unwrap();

        let text = rules.to_string();
        let mut reparsed = CfiFrameInfo::default();
        let () = reparsed.parse_rules(&text).unwrap();
        assert_eq!(reparsed, rules);
        assert_eq!(reparsed.to_string(), text);
    }
}
