//! The relationship and visibility gate.
//!
//! Every read that shows one user's content to another goes through
//! [`is_visible`]. A block is one-directional: the blocker stops seeing the
//! blocked user's content everywhere, and public posts are additionally hidden
//! in the other direction. Users always see their own content.

use serde::Serialize;

use crate::models::models::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    Bio,
    Age,
    Dob,
    RelationshipStatus,
    ProfilePic,
    LastLogin,
    OnlineStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Post,
    ProfileField(ProfileField),
    DirectMessage,
}

/// How `viewer` stands towards `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    None,
    /// Viewer has asked target to be friends.
    PendingOutgoing,
    /// Target has asked viewer to be friends.
    PendingIncoming,
    Friends,
    /// Viewer blocked target.
    Blocked,
    /// Target blocked viewer.
    BlockedBy,
}

pub fn relationship(viewer: &User, target: &User) -> Relationship {
    if viewer.has_blocked(&target.username) {
        Relationship::Blocked
    } else if target.has_blocked(&viewer.username) {
        Relationship::BlockedBy
    } else if viewer.is_friend(&target.username) {
        Relationship::Friends
    } else if target.has_request_from(&viewer.username) {
        Relationship::PendingOutgoing
    } else if viewer.has_request_from(&target.username) {
        Relationship::PendingIncoming
    } else {
        Relationship::None
    }
}

fn field_enabled(target: &User, field: ProfileField) -> bool {
    let privacy = &target.privacy;
    match field {
        ProfileField::Bio => privacy.bio,
        ProfileField::Age => privacy.age,
        ProfileField::Dob => privacy.dob,
        ProfileField::RelationshipStatus => privacy.relationship_status,
        ProfileField::ProfilePic => privacy.profile_pic,
        ProfileField::LastLogin => privacy.last_login,
        ProfileField::OnlineStatus => privacy.online_status,
    }
}

pub fn is_visible(viewer: &User, target: &User, kind: ContentKind) -> bool {
    if viewer.username == target.username {
        return true;
    }
    if viewer.has_blocked(&target.username) {
        return false;
    }
    match kind {
        ContentKind::Post => !target.has_blocked(&viewer.username),
        ContentKind::ProfileField(field) => field_enabled(target, field),
        ContentKind::DirectMessage => relationship(viewer, target) == Relationship::Friends,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> User {
        User::new(name.to_string(), String::new(), String::new())
    }

    fn befriend(a: &mut User, b: &mut User) {
        a.friends.push(b.username.clone());
        b.friends.push(a.username.clone());
    }

    #[test]
    fn strangers_see_posts_but_cannot_message() {
        let alice = user("alice");
        let bob = user("bob");
        assert!(is_visible(&alice, &bob, ContentKind::Post));
        assert!(!is_visible(&alice, &bob, ContentKind::DirectMessage));
        assert_eq!(relationship(&alice, &bob), Relationship::None);
    }

    #[test]
    fn friends_can_message() {
        let mut alice = user("alice");
        let mut bob = user("bob");
        befriend(&mut alice, &mut bob);
        assert!(is_visible(&alice, &bob, ContentKind::DirectMessage));
        assert_eq!(relationship(&bob, &alice), Relationship::Friends);
    }

    #[test]
    fn blocking_hides_posts_both_ways() {
        let mut alice = user("alice");
        let bob = user("bob");
        alice.blocked.push("bob".to_string());

        assert!(!is_visible(&alice, &bob, ContentKind::Post));
        assert!(!is_visible(&bob, &alice, ContentKind::Post));
        assert_eq!(relationship(&alice, &bob), Relationship::Blocked);
        assert_eq!(relationship(&bob, &alice), Relationship::BlockedBy);
    }

    #[test]
    fn blocker_loses_profile_fields_of_blocked() {
        let mut alice = user("alice");
        let bob = user("bob");
        alice.blocked.push("bob".to_string());
        let bio = ContentKind::ProfileField(ProfileField::Bio);
        assert!(!is_visible(&alice, &bob, bio));
        assert!(is_visible(&bob, &alice, bio));
    }

    #[test]
    fn privacy_flags_gate_fields_for_others_only() {
        let viewer = user("carol");
        let mut target = user("dave");
        target.privacy.bio = false;

        let bio = ContentKind::ProfileField(ProfileField::Bio);
        assert!(!is_visible(&viewer, &target, bio));
        assert!(is_visible(&target, &target, bio));
        // dob is private by default
        assert!(!is_visible(&viewer, &target, ContentKind::ProfileField(ProfileField::Dob)));
        assert!(is_visible(&viewer, &target, ContentKind::ProfileField(ProfileField::Age)));
    }

    #[test]
    fn pending_requests_are_directional() {
        let alice = user("alice");
        let mut bob = user("bob");
        bob.pending_requests.push("alice".to_string());
        assert_eq!(relationship(&alice, &bob), Relationship::PendingOutgoing);
        assert_eq!(relationship(&bob, &alice), Relationship::PendingIncoming);
    }
}
