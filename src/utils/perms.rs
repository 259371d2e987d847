use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GroupPermission: u32 {
        const NONE           = 0;
        const POST           = 1 << 0;
        const MODERATE_POSTS = 1 << 1;
        const UPDATE_INFO    = 1 << 2;
        const MANAGE_MEMBERS = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupRole {
    Member,
    Moderator,
    Admin,
}

impl GroupRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupRole::Member => "member",
            GroupRole::Moderator => "moderator",
            GroupRole::Admin => "admin",
        }
    }

    pub fn from_db(value: &str) -> Option<GroupRole> {
        match value {
            "member" => Some(GroupRole::Member),
            "moderator" => Some(GroupRole::Moderator),
            "admin" => Some(GroupRole::Admin),
            _ => None,
        }
    }
}

/// Group permissions by role.
/// Members post; moderators also curate the group feed; admins run the group.
pub fn role_permissions(role: GroupRole) -> GroupPermission {
    match role {
        GroupRole::Member => GroupPermission::POST,
        GroupRole::Moderator => GroupPermission::POST | GroupPermission::MODERATE_POSTS,
        GroupRole::Admin => {
            GroupPermission::POST
                | GroupPermission::MODERATE_POSTS
                | GroupPermission::UPDATE_INFO
                | GroupPermission::MANAGE_MEMBERS
        }
    }
}

pub fn permissions_to_list(p: GroupPermission) -> Vec<&'static str> {
    let mut out = Vec::new();

    if p.contains(GroupPermission::POST) {
        out.push("POST");
    }
    if p.contains(GroupPermission::MODERATE_POSTS) {
        out.push("MODERATE_POSTS");
    }
    if p.contains(GroupPermission::UPDATE_INFO) {
        out.push("UPDATE_INFO");
    }
    if p.contains(GroupPermission::MANAGE_MEMBERS) {
        out.push("MANAGE_MEMBERS");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_only_post() {
        let p = role_permissions(GroupRole::Member);
        assert_eq!(p, GroupPermission::POST);
    }

    #[test]
    fn admin_has_everything() {
        let p = role_permissions(GroupRole::Admin);
        assert_eq!(
            permissions_to_list(p),
            vec!["POST", "MODERATE_POSTS", "UPDATE_INFO", "MANAGE_MEMBERS"]
        );
    }

    #[test]
    fn role_round_trip() {
        for role in [GroupRole::Member, GroupRole::Moderator, GroupRole::Admin] {
            assert_eq!(GroupRole::from_db(role.as_str()), Some(role));
        }
        assert_eq!(GroupRole::from_db("owner"), None);
    }
}
