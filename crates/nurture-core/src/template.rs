//! Message template rendering
//!
//! Substitutes `{{placeholder}}` tokens with lead-derived field values.
//! Rendering is pure and total: missing fields become empty strings and
//! unrecognized tokens pass through verbatim. No HTML escaping happens here;
//! callers emitting rendered text as an HTML email body must escape
//! lead-controlled fields themselves.

use nurture_types::Lead;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("valid placeholder pattern"));

/// Flat map of named fields derived from the target lead
#[derive(Debug, Clone, Default)]
pub struct LeadFields {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub address: Option<String>,
    /// Extension point for caller-supplied fields beyond the lead schema
    pub custom: HashMap<String, String>,
}

impl LeadFields {
    pub fn from_lead(lead: &Lead) -> Self {
        Self {
            first_name: lead.first_name.clone(),
            last_name: lead.last_name.clone(),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            location: lead.location.clone(),
            address: lead.address.clone(),
            custom: HashMap::new(),
        }
    }

    pub fn with_custom(mut self, name: &str, value: &str) -> Self {
        self.custom.insert(name.to_string(), value.to_string());
        self
    }

    /// Resolve a placeholder name. Recognized lead fields resolve even when
    /// absent (to the empty string); unknown names resolve to None.
    fn resolve(&self, name: &str) -> Option<String> {
        match name {
            "first_name" => Some(self.first_name.clone().unwrap_or_default()),
            "last_name" => Some(self.last_name.clone().unwrap_or_default()),
            "email" => Some(self.email.clone().unwrap_or_default()),
            "phone" => Some(self.phone.clone().unwrap_or_default()),
            "location" => Some(self.location.clone().unwrap_or_default()),
            "address" => Some(self.address.clone().unwrap_or_default()),
            _ => self.custom.get(name).cloned(),
        }
    }
}

impl From<&Lead> for LeadFields {
    fn from(lead: &Lead) -> Self {
        Self::from_lead(lead)
    }
}

/// Render a template against the given fields
pub fn render(template: &str, fields: &LeadFields) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            match fields.resolve(name) {
                Some(value) => value,
                // Unrecognized tokens are left in place, not an error
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> LeadFields {
        LeadFields {
            first_name: Some("Maria".to_string()),
            last_name: Some("Santos".to_string()),
            email: Some("maria@example.com".to_string()),
            phone: None,
            location: Some("Austin, TX".to_string()),
            address: None,
            custom: HashMap::new(),
        }
    }

    #[test]
    fn test_substitutes_known_fields() {
        let out = render("Hi {{first_name}}, homes in {{location}} are moving fast!", &fields());
        assert_eq!(out, "Hi Maria, homes in Austin, TX are moving fast!");
    }

    #[test]
    fn test_missing_field_renders_empty() {
        let out = render("Call me at {{phone}}.", &fields());
        assert_eq!(out, "Call me at .");
    }

    #[test]
    fn test_unknown_token_left_verbatim() {
        let out = render("Hello {{first_name}} {{foo}}", &fields());
        assert_eq!(out, "Hello Maria {{foo}}");
    }

    #[test]
    fn test_whitespace_inside_braces() {
        let out = render("Hi {{ first_name }}!", &fields());
        assert_eq!(out, "Hi Maria!");
    }

    #[test]
    fn test_repeated_tokens_all_replaced() {
        let out = render("{{first_name}}, yes you, {{first_name}}!", &fields());
        assert_eq!(out, "Maria, yes you, Maria!");
    }

    #[test]
    fn test_custom_fields_extend_the_map() {
        let f = fields().with_custom("agent_name", "Dana");
        let out = render("{{agent_name}} here for {{first_name}}", &f);
        assert_eq!(out, "Dana here for Maria");
    }

    #[test]
    fn test_no_placeholders_is_identity() {
        let out = render("Plain text, nothing to do.", &fields());
        assert_eq!(out, "Plain text, nothing to do.");
    }

    #[test]
    fn test_renderer_performs_no_escaping() {
        let mut f = fields();
        f.first_name = Some("<b>Maria</b>".to_string());
        let out = render("Hi {{first_name}}", &f);
        assert_eq!(out, "Hi <b>Maria</b>");
    }
}
