//! Links the presentation helpers hand to templates.

use crate::TargetRef;

pub fn add_url_for(target: &TargetRef) -> String {
    format!("/attachments/add-for/{}/{}", target.kind, target.id)
}

pub fn delete_url_for(attachment_id: &str) -> String {
    format!("/attachments/delete/{attachment_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_helpers_produce_expected_paths() {
        let target = TargetRef::new("project", "42");
        assert_eq!(add_url_for(&target), "/attachments/add-for/project/42");
        assert_eq!(delete_url_for("att-1"), "/attachments/delete/att-1");
    }
}
