/// A well-formed persisted session row, as written by the filesystem store.
pub fn session_yaml_fixture(id: &str, state: &str, create_time: &str) -> String {
    return format!(
        r#"id: {id}
state: {state}
prompt: Add retry logic to the uploader
title: Uploader retries
createTime: {create_time}
updateTime: {create_time}
"#
    );
}

/// A persisted row with an activity log, exercising the client-only fields.
pub fn session_yaml_with_activities_fixture(id: &str) -> String {
    return format!(
        r#"id: {id}
state: completed
prompt: Ship the release notes
title: Release notes
createTime: 2024-03-01T10:00:00Z
updateTime: 2024-03-01T11:30:00Z
activities:
- id: act-1
  kind: tool_call
  text: ran the release script
- id: act-2
  kind: note
  text: verified artifacts
lastActivityPollTime: 2024-03-01T11:31:00Z
"#
    );
}

/// Rows the startup validation scan must repair.
pub fn corrupt_session_fixture() -> &'static str {
    return "{{{ this is not yaml: [unclosed";
}

pub fn empty_session_fixture() -> &'static str {
    return "";
}
