use super::{MemberRecognizer, Recognition};
use crate::types::{MemberKey, MemberRef, TypeRef};
use serde_json::Value;

const OWNER: &str = "String";

/// `String.Length` and `String.Empty`.
pub struct StringMembers;

impl MemberRecognizer for StringMembers {
    fn name(&self) -> &'static str {
        "string_members"
    }

    fn declared_members(&self) -> Vec<MemberKey> {
        vec![MemberKey::new(OWNER, "Length"), MemberKey::new(OWNER, "Empty")]
    }

    fn recognize(&self, member: &MemberRef, has_receiver: bool) -> Option<Recognition> {
        if !member.owner.eq_ignore_ascii_case(OWNER) {
            return None;
        }
        match (member.name.to_ascii_lowercase().as_str(), has_receiver) {
            ("length", true) => Some(Recognition::Call {
                function: "length".to_string(),
                ty: TypeRef::int(),
            }),
            ("empty", false) => Some(Recognition::Constant {
                value: Value::String(String::new()),
                ty: TypeRef::string(),
            }),
            _ => None,
        }
    }
}
