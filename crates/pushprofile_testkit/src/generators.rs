//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random profiles that maintain the
//! invariants the sync engine relies on.

use proptest::prelude::*;
use pushprofile_protocol::{AttributeValue, CustomAttributes, Email, Gender, Installation, Phone, User};
use std::ops::Range;

/// Strategy for generating valid push registration ids.
///
/// Ids never contain `#`, so tests can build an id that is guaranteed absent.
pub fn push_registration_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9_]{1,12}").expect("Invalid regex")
}

/// Strategy for generating custom attribute values.
pub fn attribute_value_strategy() -> impl Strategy<Value = AttributeValue> {
    prop_oneof![
        any::<i32>().prop_map(|n| AttributeValue::from(i64::from(n))),
        "[a-z ]{0,12}".prop_map(AttributeValue::from),
        any::<bool>().prop_map(AttributeValue::from),
    ]
}

/// Strategy for generating custom attribute maps.
pub fn custom_attributes_strategy() -> impl Strategy<Value = CustomAttributes> {
    prop::collection::btree_map("[a-z]{1,8}", attribute_value_strategy(), 0..4)
}

fn optional_name() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[A-Z][a-z]{1,10}")
}

fn birthday() -> impl Strategy<Value = String> {
    "(19|20)[0-9]{2}-(0[1-9]|1[0-2])-(0[1-9]|1[0-9]|2[0-8])"
}

fn gender() -> impl Strategy<Value = Gender> {
    prop_oneof![Just(Gender::Male), Just(Gender::Female)]
}

/// Strategy for generating users.
pub fn arb_user() -> impl Strategy<Value = User> {
    let names = (optional_name(), optional_name(), optional_name(), optional_name());
    let details = (
        prop::option::of(birthday()),
        prop::option::of(gender()),
        prop::option::of(prop::collection::vec("[0-9]{8,12}", 0..3)),
        prop::option::of(prop::collection::vec("[a-z]{1,8}@[a-z]{1,8}\\.com", 0..3)),
    );
    let extras = (
        prop::option::of(custom_attributes_strategy()),
        prop::option::of(prop::collection::btree_set("[a-z]{1,8}", 0..4)),
        prop::option::of(arb_installation_list(0..3)),
    );

    (names, details, extras).prop_map(
        |(
            (external_user_id, first_name, middle_name, last_name),
            (birthday, gender, phones, emails),
            (custom_attributes, tags, installations),
        )| User {
            external_user_id,
            first_name,
            middle_name,
            last_name,
            birthday,
            gender,
            phones: phones.map(|numbers| numbers.into_iter().map(Phone::new).collect()),
            emails: emails.map(|addresses| addresses.into_iter().map(Email::new).collect()),
            custom_attributes,
            tags,
            installations,
        },
    )
}

/// Strategy for generating installation lists.
///
/// Ids are unique and at most one installation is primary.
pub fn arb_installation_list(size: Range<usize>) -> impl Strategy<Value = Vec<Installation>> {
    prop::collection::btree_set(push_registration_id_strategy(), size)
        .prop_flat_map(|ids| {
            let ids: Vec<String> = ids.into_iter().collect();
            let primary = if ids.is_empty() {
                Just(None).boxed()
            } else {
                prop::option::of(0..ids.len()).boxed()
            };
            (Just(ids), primary, any::<bool>())
        })
        .prop_map(|(ids, primary, notifications_enabled)| {
            ids.into_iter()
                .enumerate()
                .map(|(index, id)| Installation {
                    is_primary_device: primary == Some(index),
                    notifications_enabled,
                    ..Installation::with_registration(id)
                })
                .collect()
        })
}
