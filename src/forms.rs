use std::collections::BTreeMap;

use serde::Deserialize;
use validator::{Validate, ValidationErrors};

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RegisterForm {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "Name is required (at most 100 characters)."))]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct LoginForm {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

/// Create and edit share one form.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct PostForm {
    #[validate(length(min = 1, max = 250, message = "Title is required (at most 250 characters)."))]
    pub title: String,
    #[validate(length(min = 1, max = 250, message = "Subtitle is required (at most 250 characters)."))]
    pub subtitle: String,
    #[validate(url(message = "Enter a valid image URL."))]
    pub img_url: String,
    #[validate(length(min = 1, message = "Content is required."))]
    pub body: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct CommentForm {
    #[validate(length(min = 1, message = "Comment cannot be empty."))]
    pub comment: String,
}

/// Inline messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors(pub BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn field(&self, name: &str) -> &[String] {
        self.0.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<ValidationErrors> for FormErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = FormErrors::default();
        for (field, errs) in errors.field_errors() {
            for e in errs.iter() {
                let msg = e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string());
                out.add(&field.to_string(), msg);
            }
        }
        out
    }
}

/// Validate `form`, collecting failures as inline messages.
pub fn check<T: Validate>(form: &T) -> Result<(), FormErrors> {
    form.validate().map_err(FormErrors::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_requires_all_fields() {
        let errs = check(&RegisterForm::default()).unwrap_err();
        assert!(!errs.field("email").is_empty());
        assert!(!errs.field("password").is_empty());
        assert!(!errs.field("name").is_empty());
    }

    #[test]
    fn post_form_rejects_bad_image_url() {
        let form = PostForm {
            title: "T".into(),
            subtitle: "S".into(),
            img_url: "not a url".into(),
            body: "<p>b</p>".into(),
        };
        let errs = check(&form).unwrap_err();
        assert_eq!(errs.field("img_url"), ["Enter a valid image URL.".to_string()]);
        assert!(errs.field("title").is_empty());
    }

    #[test]
    fn valid_comment_passes() {
        assert!(check(&CommentForm { comment: "nice".into() }).is_ok());
    }
}
