use super::{MemberRecognizer, Recognition};
use crate::types::{MemberKey, MemberRef, TypeRef};

const OWNER: &str = "DateTime";

/// Clock members and date parts of `DateTime`.
pub struct DateTimeMembers;

impl MemberRecognizer for DateTimeMembers {
    fn name(&self) -> &'static str {
        "datetime_members"
    }

    fn declared_members(&self) -> Vec<MemberKey> {
        ["Now", "UtcNow", "Year", "Month", "Day"]
            .into_iter()
            .map(|name| MemberKey::new(OWNER, name))
            .collect()
    }

    fn recognize(&self, member: &MemberRef, has_receiver: bool) -> Option<Recognition> {
        if !member.owner.eq_ignore_ascii_case(OWNER) {
            return None;
        }
        let name = member.name.to_ascii_lowercase();
        match (name.as_str(), has_receiver) {
            ("now" | "utcnow", false) => Some(Recognition::Special {
                text: "CURRENT_TIMESTAMP".to_string(),
                ty: TypeRef::datetime(),
            }),
            ("year" | "month" | "day", true) => Some(Recognition::Call {
                function: name,
                ty: TypeRef::int(),
            }),
            _ => None,
        }
    }
}
