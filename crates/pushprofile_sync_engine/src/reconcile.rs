//! Installation-list transforms applied after a successful remote call.
//!
//! Pure functions: no storage, no network. Ids are matched on the push
//! registration id and the first match wins.

use pushprofile_protocol::Installation;

/// A change to the user's installation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallationEvent {
    /// The primary flag of `push_registration_id` was set or cleared.
    PrimarySwitch {
        /// Target installation.
        push_registration_id: String,
        /// New value of the flag.
        make_primary: bool,
    },
    /// `push_registration_id` was depersonalized and left the user.
    DeviceRemoval {
        /// Removed installation.
        push_registration_id: String,
    },
}

impl InstallationEvent {
    /// Applies the event to `installations`.
    pub fn apply(&self, installations: &[Installation]) -> Vec<Installation> {
        match self {
            InstallationEvent::PrimarySwitch {
                push_registration_id,
                make_primary,
            } => apply_primary_switch(installations, push_registration_id, *make_primary),
            InstallationEvent::DeviceRemoval {
                push_registration_id,
            } => apply_device_removal(installations, push_registration_id),
        }
    }
}

/// Sets or clears the primary flag on `push_registration_id`.
///
/// Every other installation loses the flag either way. An absent id returns
/// the list unchanged.
pub fn apply_primary_switch(
    installations: &[Installation],
    push_registration_id: &str,
    make_primary: bool,
) -> Vec<Installation> {
    let Some(target) = position(installations, push_registration_id) else {
        return installations.to_vec();
    };

    installations
        .iter()
        .enumerate()
        .map(|(index, installation)| {
            let mut installation = installation.clone();
            installation.is_primary_device = index == target && make_primary;
            installation
        })
        .collect()
}

/// Removes the first installation carrying `push_registration_id`.
pub fn apply_device_removal(installations: &[Installation], push_registration_id: &str) -> Vec<Installation> {
    let mut out = installations.to_vec();
    if let Some(index) = position(installations, push_registration_id) {
        out.remove(index);
    }
    out
}

fn position(installations: &[Installation], push_registration_id: &str) -> Option<usize> {
    installations
        .iter()
        .position(|installation| installation.has_registration(push_registration_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use pushprofile_testkit::fixtures::installation;
    use pushprofile_testkit::generators::arb_installation_list;

    fn ids(list: &[Installation]) -> Vec<(String, bool)> {
        list.iter()
            .map(|i| (i.push_registration_id.clone().unwrap_or_default(), i.is_primary_device))
            .collect()
    }

    #[test]
    fn switch_moves_primary_flag() {
        let list = vec![installation("A", true), installation("B", false)];
        let out = apply_primary_switch(&list, "B", true);
        assert_eq!(ids(&out), vec![("A".into(), false), ("B".into(), true)]);
    }

    #[test]
    fn clearing_primary_clears_the_holder_too() {
        let list = vec![installation("A", true), installation("B", false)];
        let out = apply_primary_switch(&list, "A", false);
        assert_eq!(ids(&out), vec![("A".into(), false), ("B".into(), false)]);

        let out = apply_primary_switch(&list, "B", false);
        assert_eq!(ids(&out), vec![("A".into(), false), ("B".into(), false)]);
    }

    #[test]
    fn removal_drops_first_match_only() {
        let list = vec![installation("A", false), installation("B", false), installation("B", true)];
        let out = apply_device_removal(&list, "B");
        assert_eq!(ids(&out), vec![("A".into(), false), ("B".into(), true)]);
    }

    #[test]
    fn event_dispatch() {
        let list = vec![installation("A", false), installation("B", false)];
        let removed = InstallationEvent::DeviceRemoval {
            push_registration_id: "B".into(),
        }
        .apply(&list);
        assert_eq!(ids(&removed), vec![("A".into(), false)]);
    }

    proptest! {
        #[test]
        fn switch_to_present_id_yields_single_primary(
            (list, pick) in arb_installation_list(1..8).prop_flat_map(|list| {
                let len = list.len();
                (Just(list), 0..len)
            })
        ) {
            let target = list[pick].push_registration_id.clone().unwrap();
            let out = apply_primary_switch(&list, &target, true);

            let primaries: Vec<_> = out.iter().filter(|i| i.is_primary_device).collect();
            prop_assert_eq!(primaries.len(), 1);
            prop_assert!(primaries[0].has_registration(&target));
            prop_assert_eq!(out.len(), list.len());
        }

        #[test]
        fn absent_id_leaves_list_unchanged(list in arb_installation_list(0..8), make_primary in any::<bool>()) {
            // generated ids never contain '#'
            let absent = "#absent";
            prop_assert_eq!(&apply_primary_switch(&list, absent, make_primary), &list);
            prop_assert_eq!(&apply_device_removal(&list, absent), &list);
        }

        #[test]
        fn removal_of_present_id_shrinks_by_one(list in arb_installation_list(1..8)) {
            let target = list[0].push_registration_id.clone().unwrap();
            let out = apply_device_removal(&list, &target);
            prop_assert_eq!(out.len(), list.len() - 1);
            prop_assert!(out.iter().all(|i| !i.has_registration(&target)));
        }
    }
}
