use std::path::Path;

use serde_json::{json, Value};

use cfbs_core::Settings;

use crate::session::Session;

/// A non-interactive session rooted at `dir` with its cache inside it.
pub fn session_in(dir: &Path) -> Session {
    let settings = Settings {
        cache_dir: Some(dir.join(".cache")),
        ..Settings::default()
    };
    Session::new(dir.to_path_buf(), settings, true)
}

/// An index with a small dependency chain and an alias.
pub fn inline_index() -> Value {
    json!({
        "autorun": {
            "description": "Enable autorun functionality",
            "tags": ["supported", "management"],
            "repo": "https://github.com/cfengine/modules",
            "by": "https://github.com/olehermanse",
            "version": "1.0.1",
            "commit": "c3b7329b240cf7ad062a0a64ee8b607af2cb912a",
            "subdirectory": "management/autorun",
            "steps": ["json def.json def.json"]
        },
        "promise-type-git": {
            "description": "Git promise type",
            "tags": ["supported", "promise-type"],
            "repo": "https://github.com/cfengine/modules",
            "by": "https://github.com/cfengine",
            "version": "0.2.0",
            "commit": "d5d4b1d3c0f3c2b1a3e4f5a6b7c8d9e0f1a2b3c4",
            "subdirectory": "promise-types/git",
            "dependencies": ["library-for-promise-types-in-python"],
            "steps": ["copy git.py modules/promises/"]
        },
        "library-for-promise-types-in-python": {
            "description": "Library for promise types in python",
            "tags": ["supported", "library"],
            "repo": "https://github.com/cfengine/modules",
            "by": "https://github.com/cfengine",
            "version": "0.1.0",
            "commit": "e5d4b1d3c0f3c2b1a3e4f5a6b7c8d9e0f1a2b3c4",
            "subdirectory": "libraries/python",
            "steps": ["copy cfengine.py modules/promises/"]
        },
        "greeter": {
            "description": "Greets someone",
            "tags": ["experimental"],
            "repo": "https://github.com/cfengine/modules",
            "by": "https://github.com/cfengine",
            "version": "1.0.0",
            "commit": "f5d4b1d3c0f3c2b1a3e4f5a6b7c8d9e0f1a2b3c4",
            "subdirectory": "examples/greeter",
            "input": [{
                "type": "string",
                "variable": "name",
                "bundle": "greeter",
                "label": "Name",
                "question": "Who should be greeted?",
                "default": "world"
            }],
            "steps": ["input ./input.json def.json"]
        },
        "git": { "alias": "promise-type-git" }
    })
}

/// Writes a policy-set project using [`inline_index`] with the given build list.
pub fn write_project(dir: &Path, build: Value) {
    let project = json!({
        "name": "test-project",
        "description": "A project used in tests",
        "type": "policy-set",
        "index": inline_index(),
        "git": false,
        "build": build
    });
    std::fs::write(
        dir.join("cfbs.json"),
        cfbs_core::pretty::pretty_sorted(&project) + "\n",
    )
    .unwrap();
}

pub fn read_project(dir: &Path) -> Value {
    let text = std::fs::read_to_string(dir.join("cfbs.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

pub fn build_names(dir: &Path) -> Vec<String> {
    read_project(dir)["build"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap().to_string())
        .collect()
}
