//! Role profile builders.
//!
//! One pure function per role. Each takes the identifying IDs of the session
//! and returns the [`RoleSubscriptionProfile`] describing what to watch.
//! Identical inputs always produce deep-equal profiles.
//!
//! Every listener uses [`ChangeKind::Any`]: screens refetch on inserts,
//! updates and deletes alike.

use crate::error::{ProfileError, ProfileResult};
use crate::filter::RowFilter;
use crate::identity::SessionIdentity;
use crate::query_key::QueryKey;
use crate::subscription::{ChangeKind, RoleSubscriptionProfile, SubscriptionConfig};
use crate::tables;

/// Students mostly see their own rapid writes echoed back (sticker reveals,
/// homework toggles), so their window is tighter.
pub const STUDENT_DEBOUNCE_MS: u64 = 300;

/// Teacher, parent and admin sessions observe low-frequency changes made by
/// others.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Build the profile matching whichever role `identity` carries.
pub fn build_profile(identity: &SessionIdentity) -> ProfileResult<RoleSubscriptionProfile> {
    match identity {
        SessionIdentity::Student {
            student_id,
            class_id,
        } => build_student_profile(student_id, class_id.as_deref()),
        SessionIdentity::Teacher {
            teacher_id,
            school_id,
            class_ids,
        } => build_teacher_profile(teacher_id, school_id, class_ids),
        SessionIdentity::Parent {
            parent_id,
            child_ids,
        } => build_parent_profile(parent_id, child_ids),
        SessionIdentity::Admin {
            admin_id,
            school_id,
        } => build_admin_profile(admin_id, school_id),
    }
}

/// Student session: everything scoped to the student's own rows.
///
/// `class_id` is absent for unenrolled students; the class leaderboard and
/// class session keys are then left out.
pub fn build_student_profile(
    student_id: &str,
    class_id: Option<&str>,
) -> ProfileResult<RoleSubscriptionProfile> {
    require("student_id", student_id)?;
    let class_id = class_id.filter(|id| !id.trim().is_empty());
    let own_rows = || RowFilter::eq("student_id", student_id);
    let leaderboard = class_id.map(|c| QueryKey::from(["class-leaderboard", c]));

    let subscriptions = vec![
        SubscriptionConfig::new(tables::STUDENT_STICKERS, ChangeKind::Any)
            .with_filter(own_rows())
            .with_query_key(["student-stickers", student_id])
            .with_query_key(["student-points", student_id])
            .with_query_keys(leaderboard.clone()),
        SubscriptionConfig::new(tables::ATTENDANCE, ChangeKind::Any)
            .with_filter(own_rows())
            .with_query_key(["student-attendance", student_id]),
        SubscriptionConfig::new(tables::SESSIONS, ChangeKind::Any)
            .with_filter(own_rows())
            .with_query_key(["student-sessions", student_id])
            .with_query_keys(class_id.map(|c| QueryKey::from(["class-sessions", c]))),
        SubscriptionConfig::new(tables::STUDENTS, ChangeKind::Any)
            .with_filter(RowFilter::eq("id", student_id))
            .with_query_key(["student", student_id])
            .with_query_key(["student-points", student_id]),
        SubscriptionConfig::new(tables::HOMEWORK, ChangeKind::Any)
            .with_filter(own_rows())
            .with_query_key(["student-homework", student_id]),
        SubscriptionConfig::new(tables::STUDENT_TROPHIES, ChangeKind::Any)
            .with_filter(own_rows())
            .with_query_key(["student-trophies", student_id])
            .with_query_keys(leaderboard),
        SubscriptionConfig::new(tables::STUDENT_ACHIEVEMENTS, ChangeKind::Any)
            .with_filter(own_rows())
            .with_query_key(["student-achievements", student_id]),
    ];

    Ok(RoleSubscriptionProfile::new(
        channel_name("student", student_id),
        subscriptions,
        STUDENT_DEBOUNCE_MS,
    ))
}

/// Teacher session: the teacher's classes plus school-wide activity.
///
/// With no assigned classes the `students` listener is dropped rather than
/// widened; `classes` stays watched so a later assignment is noticed.
pub fn build_teacher_profile(
    teacher_id: &str,
    school_id: &str,
    class_ids: &[String],
) -> ProfileResult<RoleSubscriptionProfile> {
    require("teacher_id", teacher_id)?;
    require("school_id", school_id)?;
    let school_rows = || RowFilter::eq("school_id", school_id);
    let per_class = |prefix: &str| -> Vec<QueryKey> {
        class_ids
            .iter()
            .map(|c| QueryKey::from([prefix, "class", c.as_str()]))
            .collect()
    };

    let mut subscriptions = Vec::with_capacity(5);
    if let Some(filter) = RowFilter::any_of("class_id", class_ids.iter().cloned()) {
        subscriptions.push(
            SubscriptionConfig::new(tables::STUDENTS, ChangeKind::Any)
                .with_filter(filter)
                .with_query_key(["teacher-students", teacher_id])
                .with_query_keys(per_class("students")),
        );
    }
    subscriptions.push(
        SubscriptionConfig::new(tables::SESSIONS, ChangeKind::Any)
            .with_filter(school_rows())
            .with_query_key(["teacher-sessions", teacher_id])
            .with_query_key(["sessions", "school", school_id]),
    );
    subscriptions.push(
        SubscriptionConfig::new(tables::STUDENT_STICKERS, ChangeKind::Any)
            .with_filter(school_rows())
            .with_query_key(["teacher-stickers", teacher_id])
            .with_query_keys(per_class("leaderboard")),
    );
    subscriptions.push(
        SubscriptionConfig::new(tables::ATTENDANCE, ChangeKind::Any)
            .with_filter(school_rows())
            .with_query_key(["teacher-attendance", teacher_id])
            .with_query_keys(per_class("attendance")),
    );
    subscriptions.push(
        SubscriptionConfig::new(tables::CLASSES, ChangeKind::Any)
            .with_filter(school_rows())
            .with_query_key(["teacher-classes", teacher_id])
            .with_query_key(["classes", "school", school_id]),
    );

    Ok(RoleSubscriptionProfile::new(
        channel_name("teacher", teacher_id),
        subscriptions,
        DEFAULT_DEBOUNCE_MS,
    ))
}

/// Parent session: rows belonging to any linked child.
///
/// A parent without linked children gets an empty profile.
pub fn build_parent_profile(
    parent_id: &str,
    child_ids: &[String],
) -> ProfileResult<RoleSubscriptionProfile> {
    require("parent_id", parent_id)?;
    let channel = channel_name("parent", parent_id);
    let (Some(children), Some(child_rows)) = (
        RowFilter::any_of("student_id", child_ids.iter().cloned()),
        RowFilter::any_of("id", child_ids.iter().cloned()),
    ) else {
        return Ok(RoleSubscriptionProfile::new(
            channel,
            Vec::new(),
            DEFAULT_DEBOUNCE_MS,
        ));
    };
    let per_child = |prefix: &str| -> Vec<QueryKey> {
        child_ids
            .iter()
            .map(|c| QueryKey::from([prefix, c.as_str()]))
            .collect()
    };

    let subscriptions = vec![
        SubscriptionConfig::new(tables::ATTENDANCE, ChangeKind::Any)
            .with_filter(children.clone())
            .with_query_key(["parent-attendance", parent_id])
            .with_query_keys(per_child("student-attendance")),
        SubscriptionConfig::new(tables::SESSIONS, ChangeKind::Any)
            .with_filter(children.clone())
            .with_query_key(["parent-sessions", parent_id]),
        SubscriptionConfig::new(tables::STUDENT_STICKERS, ChangeKind::Any)
            .with_filter(children.clone())
            .with_query_key(["parent-children", parent_id])
            .with_query_keys(per_child("student-stickers")),
        SubscriptionConfig::new(tables::STUDENTS, ChangeKind::Any)
            .with_filter(child_rows)
            .with_query_key(["parent-children", parent_id]),
        SubscriptionConfig::new(tables::HOMEWORK, ChangeKind::Any)
            .with_filter(children)
            .with_query_key(["parent-homework", parent_id])
            .with_query_keys(per_child("student-homework")),
    ];

    Ok(RoleSubscriptionProfile::new(
        channel,
        subscriptions,
        DEFAULT_DEBOUNCE_MS,
    ))
}

/// Admin session: school-wide activity. The channel is keyed on the admin,
/// so several admins of one school can be live at once.
pub fn build_admin_profile(
    admin_id: &str,
    school_id: &str,
) -> ProfileResult<RoleSubscriptionProfile> {
    require("admin_id", admin_id)?;
    require("school_id", school_id)?;
    let school_rows = || RowFilter::eq("school_id", school_id);
    let dashboard = QueryKey::from(["admin-dashboard", school_id]);

    let subscriptions = vec![
        SubscriptionConfig::new(tables::STUDENTS, ChangeKind::Any)
            .with_filter(school_rows())
            .with_query_key(["students", "school", school_id])
            .with_query_key(dashboard.clone()),
        SubscriptionConfig::new(tables::SESSIONS, ChangeKind::Any)
            .with_filter(school_rows())
            .with_query_key(["sessions", "school", school_id])
            .with_query_key(dashboard.clone()),
        SubscriptionConfig::new(tables::ATTENDANCE, ChangeKind::Any)
            .with_filter(school_rows())
            .with_query_key(["attendance", "school", school_id])
            .with_query_key(dashboard.clone()),
        SubscriptionConfig::new(tables::STUDENT_STICKERS, ChangeKind::Any)
            .with_filter(school_rows())
            .with_query_key(["admin-leaderboard", school_id]),
        SubscriptionConfig::new(tables::CLASSES, ChangeKind::Any)
            .with_filter(school_rows())
            .with_query_key(["classes", "school", school_id])
            .with_query_key(dashboard),
    ];

    Ok(RoleSubscriptionProfile::new(
        channel_name("admin", admin_id),
        subscriptions,
        DEFAULT_DEBOUNCE_MS,
    ))
}

fn channel_name(role: &str, id: &str) -> String {
    format!("{}-{}", role, id)
}

fn require(field: &'static str, value: &str) -> ProfileResult<()> {
    if value.trim().is_empty() {
        return Err(ProfileError::MissingIdentifier { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_student_profile_watches_own_rows() {
        let profile = build_student_profile("s-1", Some("c-1")).unwrap();
        assert_eq!(profile.channel_name, "student-s-1");
        assert_eq!(profile.debounce_ms, STUDENT_DEBOUNCE_MS);
        assert_eq!(
            profile.tables().collect::<Vec<_>>(),
            vec![
                "student_stickers",
                "attendance",
                "sessions",
                "students",
                "homework",
                "student_trophies",
                "student_achievements"
            ]
        );
        for sub in &profile.subscriptions {
            let filter = sub.filter.as_ref().unwrap();
            if sub.table == tables::STUDENTS {
                assert_eq!(filter, &RowFilter::eq("id", "s-1"));
            } else {
                assert_eq!(filter, &RowFilter::eq("student_id", "s-1"));
            }
        }
        assert!(profile
            .all_query_keys()
            .contains(&QueryKey::from(["class-leaderboard", "c-1"])));
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_unenrolled_student_omits_class_keys() {
        let profile = build_student_profile("s-1", None).unwrap();
        assert_eq!(profile.subscriptions.len(), 7);
        let roots: Vec<_> = profile
            .all_query_keys()
            .iter()
            .filter_map(|k| k.root().map(str::to_string))
            .collect();
        assert!(!roots.iter().any(|r| r == "class-leaderboard"));
        assert!(!roots.iter().any(|r| r == "class-sessions"));
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_student_requires_id() {
        assert_eq!(
            build_student_profile("", None),
            Err(ProfileError::MissingIdentifier { field: "student_id" })
        );
    }

    #[test]
    fn test_teacher_profile_scopes_students_to_classes() {
        let profile = build_teacher_profile("t-1", "sch-1", &ids(&["c-1", "c-2"])).unwrap();
        assert_eq!(profile.debounce_ms, DEFAULT_DEBOUNCE_MS);
        let students = profile.subscription_for(tables::STUDENTS).unwrap();
        assert_eq!(
            students.filter.as_ref().unwrap().to_string(),
            "class_id=in.(c-1,c-2)"
        );
        assert!(students
            .query_keys
            .contains(&QueryKey::from(["students", "class", "c-2"])));
        let classes = profile.subscription_for(tables::CLASSES).unwrap();
        assert_eq!(classes.filter, Some(RowFilter::eq("school_id", "sch-1")));
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_teacher_without_classes_still_watches_classes() {
        let profile = build_teacher_profile("t-1", "sch-1", &[]).unwrap();
        assert!(profile.subscription_for(tables::STUDENTS).is_none());
        assert!(profile.subscription_for(tables::CLASSES).is_some());
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_teacher_requires_school() {
        assert_eq!(
            build_teacher_profile("t-1", " ", &[]),
            Err(ProfileError::MissingIdentifier { field: "school_id" })
        );
    }

    #[test]
    fn test_parent_without_children_is_empty() {
        let profile = build_parent_profile("p-1", &[]).unwrap();
        assert!(profile.is_empty());
        assert!(profile.subscriptions.is_empty());
        assert_eq!(profile.channel_name, "parent-p-1");
    }

    #[test]
    fn test_parent_profile_filters_children() {
        let profile = build_parent_profile("p-1", &ids(&["s-1", "s-2"])).unwrap();
        assert_eq!(profile.subscriptions.len(), 5);
        let students = profile.subscription_for(tables::STUDENTS).unwrap();
        assert_eq!(
            students.filter.as_ref().unwrap().to_string(),
            "id=in.(s-1,s-2)"
        );
        let homework = profile.subscription_for(tables::HOMEWORK).unwrap();
        assert_eq!(
            homework.filter.as_ref().unwrap().to_string(),
            "student_id=in.(s-1,s-2)"
        );
    }

    #[test]
    fn test_admin_profile_is_school_wide() {
        let profile = build_admin_profile("adm-1", "sch-1").unwrap();
        assert_eq!(profile.channel_name, "admin-adm-1");
        assert_eq!(profile.subscriptions.len(), 5);
        assert!(profile
            .subscriptions
            .iter()
            .all(|s| s.filter == Some(RowFilter::eq("school_id", "sch-1"))));
    }

    #[test]
    fn test_admins_of_one_school_get_distinct_channels() {
        let first = build_admin_profile("adm-1", "sch-1").unwrap();
        let second = build_admin_profile("adm-2", "sch-1").unwrap();
        assert_ne!(first.channel_name, second.channel_name);
        assert_eq!(first.subscriptions, second.subscriptions);
        assert!(matches!(
            build_admin_profile(" ", "sch-1"),
            Err(ProfileError::MissingIdentifier { field: "admin_id" })
        ));
    }

    #[test]
    fn test_build_profile_dispatches_on_role() {
        let identity = SessionIdentity::Parent {
            parent_id: "p-1".to_string(),
            child_ids: ids(&["s-1"]),
        };
        assert_eq!(
            build_profile(&identity).unwrap(),
            build_parent_profile("p-1", &ids(&["s-1"])).unwrap()
        );
    }
}
