//! Crate-local macros.

/// Placeholder printed in place of redacted field values.
pub(crate) const REDACTED: &str = "[REDACTED]";

/// Implement `fmt::Debug` for a struct while masking credential fields.
///
/// Each listed field is prefixed with one of:
///
/// - `show` - the value is printed as-is
/// - `redact` - the placeholder is printed instead of the value
/// - `redact_option` - the `Some`/`None` shape survives, the value does not
///
/// Unlisted fields are omitted and the output ends with `..`, so the
/// omission is visible in logs.
///
/// ```ignore
/// redacted_debug!(Session {
///     show id,
///     show token_prefix,
///     redact token_hash,
/// });
/// ```
macro_rules! redacted_debug {
    ($name:ident { $( $kind:ident $field:ident ),* $(,)? }) => {
        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                let mut out = f.debug_struct(stringify!($name));
                $( redacted_debug!(@field out, self, $kind $field); )*
                out.finish_non_exhaustive()
            }
        }
    };
    (@field $out:ident, $self:ident, show $field:ident) => {
        $out.field(stringify!($field), &$self.$field);
    };
    (@field $out:ident, $self:ident, redact $field:ident) => {
        $out.field(stringify!($field), &crate::macros::REDACTED);
    };
    (@field $out:ident, $self:ident, redact_option $field:ident) => {
        $out.field(
            stringify!($field),
            &$self.$field.as_ref().map(|_| crate::macros::REDACTED),
        );
    };
}

#[cfg(test)]
mod tests {
    #[allow(dead_code)]
    struct Credential {
        username: String,
        token: String,
        recovery_code: Option<String>,
        internal_note: String,
    }

    redacted_debug!(Credential {
        show username,
        redact token,
        redact_option recovery_code,
    });

    fn credential(recovery_code: Option<&str>) -> Credential {
        Credential {
            username: "jdoe".to_string(),
            token: "cd_12ab34cd_opaque_token_body".to_string(),
            recovery_code: recovery_code.map(String::from),
            internal_note: "unlisted".to_string(),
        }
    }

    #[test]
    fn test_redacted_fields_never_reach_output() {
        let output = format!("{:?}", credential(Some("recovery-phrase")));
        assert!(output.contains("jdoe"));
        assert!(!output.contains("opaque_token_body"));
        assert!(!output.contains("recovery-phrase"));
        assert!(output.contains(super::REDACTED));
    }

    #[test]
    fn test_option_keeps_some_none_shape() {
        let some = format!("{:?}", credential(Some("recovery-phrase")));
        assert!(some.contains("Some"));

        let none = format!("{:?}", credential(None));
        assert!(none.contains("None"));
        assert!(!none.contains("opaque_token_body"));
    }

    #[test]
    fn test_unlisted_fields_are_elided() {
        let output = format!("{:?}", credential(None));
        assert!(!output.contains("unlisted"));
        assert!(output.contains(".."));
    }
}
