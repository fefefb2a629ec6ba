//! Wraps the user's prompt with per-agent operating instructions.

use std::path::Path;

use crate::workspace::AgentWorkspace;

/// Build the prompt an agent receives.
///
/// Pure: identical inputs always give identical output. The original
/// prompt is appended verbatim as the final section.
pub fn augment_prompt(
    original: &str,
    workspace: &AgentWorkspace,
    container_workdir: &Path,
) -> String {
    let workdir = container_workdir.display();
    let id = workspace.agent_id;
    let branch = &workspace.branch_name;

    format!(
        "You are agent {id}, working on git branch `{branch}`.\n\
         \n\
         Your working directory is {workdir}. Create, edit and run everything \
         inside {workdir}; it is your own isolated checkout and no other agent \
         can see it.\n\
         \n\
         Before you finish you MUST stage and commit all of your changes:\n\
         \n\
         \x20   cd {workdir} && git add -A && git commit -m \"agent-{id}: <short summary>\"\n\
         \n\
         Use the `agent-{id}: ` prefix for every commit message, for example \
         `agent-{id}: add input validation to the parser`.\n\
         \n\
         ## Task\n\
         \n\
         {original}"
    )
}
