/// Deserialization tests against representative service payloads.
#[cfg(test)]
mod unit {
    use crate::types::{
        DocumentDetails, DocumentResponse, IntegrationResponse, ProjectsResponse, SelfResponse,
        TaskSpecsResponse, WorklogItem, WorklogScope,
    };

    #[test]
    fn parse_task_document() {
        let json = r#"{
            "document": {
                "id": "t1",
                "title": "Add Login",
                "type": "TASK",
                "projectId": "p1",
                "parentId": "f1",
                "numericId": 42,
                "details": "{\"repoName\":\"acme/api\",\"status\":\"IN_PROGRESS\"}",
                "someFutureField": true
            }
        }"#;
        let resp: DocumentResponse = serde_json::from_str(json).unwrap();
        let doc = resp.document.unwrap();
        assert_eq!(doc.project_id, "p1");
        assert_eq!(doc.parent_id, "f1");
        assert!(!doc.is_feature());
        let details = doc.parsed_details().unwrap();
        assert_eq!(details.repo_name, "acme/api");
        assert!(details.repo_names.is_empty());

        let r = doc.doc_ref();
        assert_eq!(r.id, "t1");
        assert_eq!(r.numeric_id, Some(42));
    }

    #[test]
    fn parse_feature_details() {
        let json = r#"{"document": {"id": "f1", "type": "FEATURE",
            "details": "{\"repoNames\":[\"acme/api\",\"acme/web\"]}"}}"#;
        let doc = serde_json::from_str::<DocumentResponse>(json)
            .unwrap()
            .document
            .unwrap();
        assert!(doc.is_feature());
        assert_eq!(
            doc.parsed_details().unwrap().repo_names,
            vec!["acme/api", "acme/web"]
        );
    }

    #[test]
    fn empty_details_are_default() {
        let resp: DocumentResponse = serde_json::from_str(r#"{"document": {"id": "x"}}"#).unwrap();
        let doc = resp.document.unwrap();
        assert_eq!(doc.parsed_details().unwrap(), DocumentDetails::default());
        assert_eq!(doc.doc_ref().numeric_id, None);
    }

    #[test]
    fn parse_projects_with_docs() {
        let json = r#"{"projects": [
            {"project": {"id": "p1", "title": "My Project", "numericId": 7},
             "docs": [{"id": "f1", "title": "Checkout", "type": "FEATURE", "projectId": "p1"}]},
            {"project": {"id": "p2", "title": "Other"}}
        ]}"#;
        let resp: ProjectsResponse = serde_json::from_str(json).unwrap();
        let p1 = resp.find_project("p1").unwrap();
        assert_eq!(p1.project.title, "My Project");
        assert_eq!(p1.find_doc("f1").unwrap().title, "Checkout");
        assert!(resp.find_project("p2").unwrap().docs.is_empty());
        assert!(resp.find_project("p3").is_none());
    }

    #[test]
    fn parse_self() {
        let json = r#"{"owner": {"id": "u1", "displayName": "Ada"}, "companies": [{"id": 3, "name": "Acme"}]}"#;
        let me: SelfResponse = serde_json::from_str(json).unwrap();
        assert_eq!(me.owner.unwrap().display_name, "Ada");
        assert_eq!(me.companies[0].name, "Acme");
    }

    #[test]
    fn integration_without_info_has_no_repos() {
        let resp: IntegrationResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.repositories().is_empty());
    }

    #[test]
    fn parse_spec_manifest() {
        let json = r#"{"specs": [{"name": "design.md", "checksum": "abc"}], "pathsInfo": {}}"#;
        let resp: TaskSpecsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.specs.len(), 1);
        assert_eq!(resp.specs[0].name, "design.md");
        assert_eq!(resp.task_dir("t1"), None);

        let json = r#"{"pathsInfo": {"taskPaths": {
            "t1": {"taskDir": "devplan/auth/t1"},
            "t2": {"taskDir": " "}
        }}}"#;
        let resp: TaskSpecsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.task_dir("t1"), Some("devplan/auth/t1"));
        assert_eq!(resp.task_dir("t2"), None);
        assert!(resp.specs.is_empty());
    }

    #[test]
    fn worklog_serializes_only_set_fields() {
        let item = WorklogItem::new(5, WorklogScope::Task("t1".into()), "done")
            .with_type("review")
            .with_agent("claude");
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "message": "done",
                "companyId": 5,
                "taskId": "t1",
                "type": "REVIEW",
                "agentName": "claude",
            })
        );
    }

    #[test]
    fn worklog_scope_and_activity_id() {
        let item = WorklogItem::new(5, WorklogScope::Feature("f1".into()), "m");
        assert_eq!(item.scope(), WorklogScope::Feature("f1".into()));
        assert_eq!(item.activity_id(), "f1");
        let blank = item.clone().with_type("  ");
        assert!(blank.kind.is_empty());
    }
}
