// src/models/contact.rs
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::dates::{parse_created_date, render_created_date};

/// Normalized contact fields a matching rule can be defined over.
///
/// Serialized with the short column codes used in the normalized base and
/// in rule files (`LN`, `ST3`, `EMAIL`, ...). Deserialization goes through
/// `FromStr`, so codes are case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum ContactField {
    #[serde(rename = "SAL")]
    Salutation,
    #[serde(rename = "FN")]
    FirstName,
    #[serde(rename = "LN")]
    LastName,
    #[serde(rename = "ST1")]
    Street1,
    #[serde(rename = "ST2")]
    Street2,
    #[serde(rename = "ST3")]
    Street3,
    #[serde(rename = "ST4")]
    Street4,
    #[serde(rename = "PC")]
    PostalCode,
    #[serde(rename = "CITY")]
    City,
    #[serde(rename = "EMAIL")]
    Email,
    #[serde(rename = "MOBILE")]
    MobilePhone,
    #[serde(rename = "HOME")]
    HomePhone,
}

impl ContactField {
    pub const ALL: [ContactField; 12] = [
        ContactField::Salutation,
        ContactField::FirstName,
        ContactField::LastName,
        ContactField::Street1,
        ContactField::Street2,
        ContactField::Street3,
        ContactField::Street4,
        ContactField::PostalCode,
        ContactField::City,
        ContactField::Email,
        ContactField::MobilePhone,
        ContactField::HomePhone,
    ];

    pub const ADDRESS: [ContactField; 6] = [
        ContactField::Street1,
        ContactField::Street2,
        ContactField::Street3,
        ContactField::Street4,
        ContactField::PostalCode,
        ContactField::City,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            ContactField::Salutation => "SAL",
            ContactField::FirstName => "FN",
            ContactField::LastName => "LN",
            ContactField::Street1 => "ST1",
            ContactField::Street2 => "ST2",
            ContactField::Street3 => "ST3",
            ContactField::Street4 => "ST4",
            ContactField::PostalCode => "PC",
            ContactField::City => "CITY",
            ContactField::Email => "EMAIL",
            ContactField::MobilePhone => "MOBILE",
            ContactField::HomePhone => "HOME",
        }
    }

    pub fn is_address(&self) -> bool {
        ContactField::ADDRESS.contains(self)
    }
}

impl fmt::Display for ContactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ContactField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_uppercase();
        match ContactField::ALL.iter().find(|f| f.code() == code) {
            Some(field) => Ok(*field),
            None => bail!("Unknown contact field code '{}'", s),
        }
    }
}

impl TryFrom<String> for ContactField {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// A contact after normalization. Every text field is an empty string when
/// the source had no value; `created_date` is `None` when the source date
/// was empty or unparsable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactRecord {
    pub id: String,
    pub salutation: String,
    pub first_name: String,
    pub last_name: String,
    pub street1: String,
    pub street2: String,
    pub street3: String,
    pub street4: String,
    pub postal_code: String,
    pub city: String,
    pub email: String,
    pub mobile_phone: String,
    pub home_phone: String,
    pub created_date: Option<DateTime<Utc>>,
    /// ISO rendering of `created_date`, empty when missing.
    pub created_date_iso: String,
}

impl ContactRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Sets the creation date from its textual form. Unparsable input is
    /// stored as missing.
    pub fn with_created_date(mut self, raw: &str) -> Self {
        self.set_created_date(raw);
        self
    }

    pub fn set_created_date(&mut self, raw: &str) {
        self.created_date = parse_created_date(raw);
        self.created_date_iso = self
            .created_date
            .as_ref()
            .map(render_created_date)
            .unwrap_or_default();
    }

    pub fn with_field(mut self, field: ContactField, value: impl Into<String>) -> Self {
        *self.field_mut(field) = value.into();
        self
    }

    pub fn get(&self, field: ContactField) -> &str {
        match field {
            ContactField::Salutation => &self.salutation,
            ContactField::FirstName => &self.first_name,
            ContactField::LastName => &self.last_name,
            ContactField::Street1 => &self.street1,
            ContactField::Street2 => &self.street2,
            ContactField::Street3 => &self.street3,
            ContactField::Street4 => &self.street4,
            ContactField::PostalCode => &self.postal_code,
            ContactField::City => &self.city,
            ContactField::Email => &self.email,
            ContactField::MobilePhone => &self.mobile_phone,
            ContactField::HomePhone => &self.home_phone,
        }
    }

    pub fn field_mut(&mut self, field: ContactField) -> &mut String {
        match field {
            ContactField::Salutation => &mut self.salutation,
            ContactField::FirstName => &mut self.first_name,
            ContactField::LastName => &mut self.last_name,
            ContactField::Street1 => &mut self.street1,
            ContactField::Street2 => &mut self.street2,
            ContactField::Street3 => &mut self.street3,
            ContactField::Street4 => &mut self.street4,
            ContactField::PostalCode => &mut self.postal_code,
            ContactField::City => &mut self.city,
            ContactField::Email => &mut self.email,
            ContactField::MobilePhone => &mut self.mobile_phone,
            ContactField::HomePhone => &mut self.home_phone,
        }
    }

    /// True when at least one street, postal code or city field is non-blank.
    pub fn has_address(&self) -> bool {
        ContactField::ADDRESS
            .iter()
            .any(|f| !self.get(*f).trim().is_empty())
    }

    pub fn has_value(&self, field: ContactField) -> bool {
        !self.get(field).trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_codes_round_trip_through_from_str() {
        for field in ContactField::ALL {
            assert_eq!(field.code().parse::<ContactField>().unwrap(), field);
        }
        assert_eq!(" mobile ".parse::<ContactField>().unwrap(), ContactField::MobilePhone);
        assert!("STREET".parse::<ContactField>().is_err());
    }

    #[test]
    fn test_address_detection() {
        let empty = ContactRecord::new("001");
        assert!(!empty.has_address());

        let only_city = ContactRecord::new("002").with_field(ContactField::City, "PARIS");
        assert!(only_city.has_address());

        let blank_street = ContactRecord::new("003").with_field(ContactField::Street3, "   ");
        assert!(!blank_street.has_address());
    }

    #[test]
    fn test_unparsable_created_date_is_missing() {
        let record = ContactRecord::new("001").with_created_date("not a date");
        assert!(record.created_date.is_none());
        assert_eq!(record.created_date_iso, "");

        let record = ContactRecord::new("002").with_created_date("2021-06-15");
        assert!(record.created_date.is_some());
        assert_eq!(record.created_date_iso, "2021-06-15T00:00:00+00:00");
    }
}
