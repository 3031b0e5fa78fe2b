// src/matching/eligibility.rs
use crate::matching::match_key::build_match_key;
use crate::models::contact::{ContactField, ContactRecord};

/// A record that passed a rule's pre-filters, with its computed key.
#[derive(Debug, Clone)]
pub struct KeyedRecord<'a> {
    pub record: &'a ContactRecord,
    pub match_key: String,
}

/// Data requirements a rule places on records before keys are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EligibilityRequirements {
    pub address: bool,
    pub email: bool,
    pub mobile: bool,
    pub home: bool,
}

impl EligibilityRequirements {
    pub fn for_fields(fields: &[ContactField]) -> Self {
        Self {
            address: fields.iter().any(|f| f.is_address()),
            email: fields.contains(&ContactField::Email),
            mobile: fields.contains(&ContactField::MobilePhone),
            home: fields.contains(&ContactField::HomePhone),
        }
    }

    pub fn accepts(&self, record: &ContactRecord) -> bool {
        (!self.address || record.has_address())
            && (!self.email || record.has_value(ContactField::Email))
            && (!self.mobile || record.has_value(ContactField::MobilePhone))
            && (!self.home || record.has_value(ContactField::HomePhone))
    }
}

/// Lazily yields the records eligible for a rule over `fields`, keyed.
/// Records failing a data requirement or with an empty key are dropped.
pub fn keyed_records<'a>(
    records: &'a [ContactRecord],
    fields: &'a [ContactField],
) -> impl Iterator<Item = KeyedRecord<'a>> + 'a {
    let requirements = EligibilityRequirements::for_fields(fields);
    records
        .iter()
        .filter(move |r| requirements.accepts(r))
        .filter_map(move |record| {
            let match_key = build_match_key(record, fields);
            if match_key.is_empty() {
                None
            } else {
                Some(KeyedRecord { record, match_key })
            }
        })
}

pub fn eligible_records<'a>(
    records: &'a [ContactRecord],
    fields: &'a [ContactField],
) -> Vec<KeyedRecord<'a>> {
    keyed_records(records, fields).collect()
}
