use proptest::prelude::*;
use schoolsync_core::{
    build_admin_profile, build_parent_profile, build_profile, build_student_profile,
    build_teacher_profile, SessionIdentity,
};

fn id_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,8}-[a-z0-9]{1,8}"
}

fn ids_strategy() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(id_strategy(), 0..6)
}

fn identity_strategy() -> impl Strategy<Value = SessionIdentity> {
    prop_oneof![
        (id_strategy(), proptest::option::of(id_strategy())).prop_map(|(student_id, class_id)| {
            SessionIdentity::Student {
                student_id,
                class_id,
            }
        }),
        (id_strategy(), id_strategy(), ids_strategy()).prop_map(
            |(teacher_id, school_id, class_ids)| SessionIdentity::Teacher {
                teacher_id,
                school_id,
                class_ids,
            }
        ),
        (id_strategy(), ids_strategy()).prop_map(|(parent_id, child_ids)| {
            SessionIdentity::Parent {
                parent_id,
                child_ids,
            }
        }),
        (id_strategy(), id_strategy()).prop_map(|(admin_id, school_id)| SessionIdentity::Admin {
            admin_id,
            school_id,
        }),
    ]
}

#[test]
fn parent_profile_is_pure() {
    let children = vec!["c1".to_string(), "c2".to_string()];
    let first = build_parent_profile("p", &children).unwrap();
    let second = build_parent_profile("p", &children).unwrap();
    assert_eq!(first, second);
}

#[test]
fn parent_without_children_never_subscribes() {
    let profile = build_parent_profile("p", &[]).unwrap();
    assert!(profile.subscriptions.is_empty());
    assert!(profile.validate().is_ok());
}

proptest! {
    #[test]
    fn profiles_are_deterministic(identity in identity_strategy()) {
        let first = build_profile(&identity).unwrap();
        let second = build_profile(&identity.clone()).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn built_profiles_always_validate(identity in identity_strategy()) {
        let profile = build_profile(&identity).unwrap();
        prop_assert!(profile.validate().is_ok());
        prop_assert!(profile.channel_name.contains(identity.user_id()));
        prop_assert!(profile.channel_name.starts_with(identity.role().as_str()));
    }

    #[test]
    fn no_filter_renders_an_empty_membership(identity in identity_strategy()) {
        let profile = build_profile(&identity).unwrap();
        for sub in &profile.subscriptions {
            if let Some(filter) = &sub.filter {
                prop_assert!(!filter.to_string().ends_with("in.()"));
            }
        }
    }

    #[test]
    fn teacher_students_listener_tracks_class_set(class_ids in ids_strategy()) {
        let profile = build_teacher_profile("t", "sch", &class_ids).unwrap();
        prop_assert_eq!(profile.subscription_for("students").is_some(), !class_ids.is_empty());
        prop_assert!(profile.subscription_for("classes").is_some());
    }

    #[test]
    fn student_debounce_is_tighter(student in id_strategy(), admin in id_strategy(), school in id_strategy()) {
        let student_profile = build_student_profile(&student, None).unwrap();
        let admin_profile = build_admin_profile(&admin, &school).unwrap();
        prop_assert!(student_profile.debounce_ms < admin_profile.debounce_ms);
    }
}
