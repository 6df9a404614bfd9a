//! Deterministic project scaffolding derived from a manifest.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::core::path::normalize_path;
use crate::core::types::Manifest;

/// Boilerplate derived from a manifest before any task runs.
///
/// Maps are keyed by normalized relative path so output order is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Scaffold {
    pub directories: Vec<String>,
    pub config_files: BTreeMap<String, String>,
    pub boilerplate_files: BTreeMap<String, String>,
}

impl Scaffold {
    /// Every scaffolded file, config first.
    pub fn files(&self) -> impl Iterator<Item = (&String, &String)> {
        self.config_files.iter().chain(self.boilerplate_files.iter())
    }

    /// Scaffolded files whose paths the manifest does not list. Listed paths
    /// belong to tasks and are left for the generator to write.
    pub fn unlisted_files(&self, manifest: &Manifest) -> Vec<(&String, &String)> {
        let listed: BTreeSet<String> = manifest
            .files
            .iter()
            .map(|file| normalize_path(&file.path))
            .collect();
        self.files()
            .filter(|(path, _)| !listed.contains(&normalize_path(path)))
            .collect()
    }

    pub fn file_count(&self) -> usize {
        self.config_files.len() + self.boilerplate_files.len()
    }
}

pub fn scaffold(manifest: &Manifest) -> Scaffold {
    let ts = manifest.tech_stack.is_typescript();
    let tailwind = manifest.tech_stack.uses_tailwind();
    let react = manifest
        .tech_stack
        .framework
        .to_ascii_lowercase()
        .contains("react");

    let mut config_files = BTreeMap::new();
    config_files.insert("package.json".to_string(), package_json(manifest, ts, tailwind, react));
    config_files.insert(".gitignore".to_string(), GITIGNORE.to_string());
    let vite_name = if ts { "vite.config.ts" } else { "vite.config.js" };
    config_files.insert(vite_name.to_string(), vite_config(react));
    if ts {
        config_files.insert("tsconfig.json".to_string(), tsconfig());
    }
    if tailwind {
        config_files.insert("tailwind.config.js".to_string(), TAILWIND_CONFIG.to_string());
        config_files.insert("postcss.config.js".to_string(), POSTCSS_CONFIG.to_string());
    }

    let entry = if ts { "src/main.tsx" } else { "src/main.jsx" };
    let mut boilerplate_files = BTreeMap::new();
    boilerplate_files.insert(
        "index.html".to_string(),
        index_html(&manifest.project_name, entry),
    );
    boilerplate_files.insert(entry.to_string(), main_entry(react));
    boilerplate_files.insert(
        "src/index.css".to_string(),
        index_css(&manifest.design_tokens, tailwind),
    );

    let mut directories: BTreeSet<String> = ["src", "public"].map(String::from).into();
    for file in &manifest.files {
        let path = normalize_path(&file.path);
        let mut parent = path.as_str();
        while let Some((dir, _)) = parent.rsplit_once('/') {
            directories.insert(dir.to_string());
            parent = dir;
        }
    }

    Scaffold {
        directories: directories.into_iter().collect(),
        config_files,
        boilerplate_files,
    }
}

/// Split a `name@version` dependency entry. Scoped names keep their leading `@`.
pub fn split_dependency(entry: &str) -> (String, String) {
    let entry = entry.trim();
    match entry.rfind('@') {
        Some(idx) if idx > 0 => {
            let version = entry[idx + 1..].trim();
            let version = if version.is_empty() { "latest" } else { version };
            (entry[..idx].to_string(), version.to_string())
        }
        _ => (entry.to_string(), "latest".to_string()),
    }
}

/// npm-safe package name for a free-form project name.
pub fn package_name(project_name: &str) -> String {
    let mut out = String::new();
    for ch in project_name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "app".to_string()
    } else {
        trimmed.to_string()
    }
}

fn package_json(manifest: &Manifest, ts: bool, tailwind: bool, react: bool) -> String {
    let mut dependencies = Map::new();
    if react {
        dependencies.insert("react".to_string(), json!("^18.3.1"));
        dependencies.insert("react-dom".to_string(), json!("^18.3.1"));
    }
    for entry in &manifest.dependencies {
        let (name, version) = split_dependency(entry);
        if !name.is_empty() {
            dependencies.insert(name, Value::String(version));
        }
    }

    let mut dev = Map::new();
    dev.insert("vite".to_string(), json!("^5.4.0"));
    if react {
        dev.insert("@vitejs/plugin-react".to_string(), json!("^4.3.1"));
    }
    if ts {
        dev.insert("typescript".to_string(), json!("^5.5.4"));
        if react {
            dev.insert("@types/react".to_string(), json!("^18.3.3"));
            dev.insert("@types/react-dom".to_string(), json!("^18.3.0"));
        }
    }
    if tailwind {
        dev.insert("tailwindcss".to_string(), json!("^3.4.10"));
        dev.insert("postcss".to_string(), json!("^8.4.41"));
        dev.insert("autoprefixer".to_string(), json!("^10.4.20"));
    }

    let build = if ts { "tsc && vite build" } else { "vite build" };
    let doc = json!({
        "name": package_name(&manifest.project_name),
        "private": true,
        "version": "0.1.0",
        "type": "module",
        "scripts": {
            "dev": "vite",
            "build": build,
            "preview": "vite preview"
        },
        "dependencies": Value::Object(dependencies),
        "devDependencies": Value::Object(dev),
    });
    pretty(&doc)
}

fn tsconfig() -> String {
    pretty(&json!({
        "compilerOptions": {
            "target": "ES2020",
            "useDefineForClassFields": true,
            "lib": ["ES2020", "DOM", "DOM.Iterable"],
            "module": "ESNext",
            "skipLibCheck": true,
            "moduleResolution": "bundler",
            "resolveJsonModule": true,
            "isolatedModules": true,
            "noEmit": true,
            "jsx": "react-jsx",
            "strict": true,
            "baseUrl": ".",
            "paths": { "@/*": ["src/*"] }
        },
        "include": ["src"]
    }))
}

fn pretty(value: &Value) -> String {
    let mut text = serde_json::to_string_pretty(value).unwrap_or_default();
    text.push('\n');
    text
}

fn vite_config(react: bool) -> String {
    if react {
        "import { defineConfig } from 'vite';\nimport react from '@vitejs/plugin-react';\n\nexport default defineConfig({\n  plugins: [react()],\n});\n".to_string()
    } else {
        "import { defineConfig } from 'vite';\n\nexport default defineConfig({});\n".to_string()
    }
}

fn index_html(project_name: &str, entry: &str) -> String {
    let title = project_name
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        "<!doctype html>\n<html lang=\"en\">\n  <head>\n    <meta charset=\"UTF-8\" />\n    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\" />\n    <title>{title}</title>\n  </head>\n  <body>\n    <div id=\"root\"></div>\n    <script type=\"module\" src=\"/{entry}\"></script>\n  </body>\n</html>\n"
    )
}

/// Import specifier of the root component as the store will key it.
fn app_specifier() -> String {
    let path = normalize_path(ROOT_COMPONENT);
    let relative = path.strip_prefix("src/").unwrap_or(&path);
    let stem = relative.rsplit_once('.').map_or(relative, |(stem, _)| stem);
    format!("./{stem}")
}

fn main_entry(react: bool) -> String {
    if react {
        format!(
            "import React from 'react';\nimport ReactDOM from 'react-dom/client';\nimport App from '{}';\nimport './index.css';\n\nReactDOM.createRoot(document.getElementById('root')!).render(\n  <React.StrictMode>\n    <App />\n  </React.StrictMode>,\n);\n",
            app_specifier()
        )
    } else {
        "import './index.css';\n".to_string()
    }
}

fn index_css(tokens: &BTreeMap<String, Value>, tailwind: bool) -> String {
    let mut out = String::new();
    if tailwind {
        out.push_str("@tailwind base;\n@tailwind components;\n@tailwind utilities;\n\n");
    }
    let mut vars = Vec::new();
    for (name, value) in tokens {
        flatten_token(&css_ident(name), value, &mut vars);
    }
    out.push_str(":root {\n");
    for (name, value) in vars {
        out.push_str(&format!("  --{name}: {value};\n"));
    }
    out.push_str("}\n");
    out
}

fn flatten_token(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_token(&format!("{prefix}-{}", css_ident(key)), nested, out);
            }
        }
        Value::String(text) => out.push((prefix.to_string(), text.clone())),
        Value::Null => {}
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

fn css_ident(name: &str) -> String {
    let mut out = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if ch.is_ascii_uppercase() && !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}

const ROOT_COMPONENT: &str = "src/App.tsx";

const GITIGNORE: &str = "node_modules\ndist\n.env\n.env.local\n*.log\n.DS_Store\n";

const TAILWIND_CONFIG: &str = "/** @type {import('tailwindcss').Config} */\nexport default {\n  content: ['./index.html', './src/**/*.{js,ts,jsx,tsx}'],\n  theme: {\n    extend: {},\n  },\n  plugins: [],\n};\n";

const POSTCSS_CONFIG: &str =
    "export default {\n  plugins: {\n    tailwindcss: {},\n    autoprefixer: {},\n  },\n};\n";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::ProjectFileStore;
    use crate::core::types::{ManifestFile, TechStack};

    fn manifest() -> Manifest {
        Manifest {
            project_name: "Todo Board!".to_string(),
            tech_stack: TechStack {
                framework: "React".to_string(),
                language: "TypeScript".to_string(),
                styling: Some("Tailwind CSS".to_string()),
            },
            design_tokens: BTreeMap::from([
                ("primaryColor".to_string(), json!("#3355ff")),
                ("spacing".to_string(), json!({"sm": "4px", "md": 8})),
            ]),
            files: vec![
                ManifestFile {
                    path: "src/App.tsx".to_string(),
                    description: "root".to_string(),
                },
                ManifestFile {
                    path: "src/components/ui/button.tsx".to_string(),
                    description: String::new(),
                },
            ],
            dependencies: vec![
                "zustand@^4.5.0".to_string(),
                "@tanstack/react-query@5".to_string(),
                "clsx".to_string(),
            ],
        }
    }

    #[test]
    fn entry_imports_the_stored_root_component() {
        let manifest = manifest();
        let out = scaffold(&manifest);
        let entry = &out.boilerplate_files["src/main.tsx"];
        let specifier = entry
            .lines()
            .find_map(|line| line.strip_prefix("import App from '"))
            .and_then(|rest| rest.strip_suffix("';"))
            .expect("app import");
        assert_eq!(specifier, "./app");

        let mut store = ProjectFileStore::new();
        for file in &manifest.files {
            store.commit(&file.path, String::new());
        }
        let target = format!("src/{}.tsx", specifier.trim_start_matches("./"));
        assert!(store.get(&target).is_some(), "{target} not in store");
    }

    #[test]
    fn manifest_listed_boilerplate_is_left_to_the_generator() {
        let mut manifest = manifest();
        manifest.files.push(ManifestFile {
            path: "src/main.tsx".to_string(),
            description: "entry".to_string(),
        });
        let out = scaffold(&manifest);
        let unlisted: Vec<&str> = out
            .unlisted_files(&manifest)
            .into_iter()
            .map(|(path, _)| path.as_str())
            .collect();

        assert!(!unlisted.contains(&"src/main.tsx"));
        assert!(unlisted.contains(&"src/index.css"));
        assert!(unlisted.contains(&"package.json"));
        assert_eq!(unlisted.len(), out.file_count() - 1);
    }

    #[test]
    fn split_dependency_keeps_scope() {
        assert_eq!(
            split_dependency("@tanstack/react-query@5"),
            ("@tanstack/react-query".to_string(), "5".to_string())
        );
        assert_eq!(
            split_dependency("@types/node"),
            ("@types/node".to_string(), "latest".to_string())
        );
        assert_eq!(
            split_dependency("clsx@"),
            ("clsx".to_string(), "latest".to_string())
        );
    }

    #[test]
    fn package_json_lists_manifest_dependencies() {
        let out = scaffold(&manifest());
        let pkg: Value =
            serde_json::from_str(&out.config_files["package.json"]).expect("package.json");
        assert_eq!(pkg["name"], "todo-board");
        assert_eq!(pkg["dependencies"]["zustand"], "^4.5.0");
        assert_eq!(pkg["dependencies"]["@tanstack/react-query"], "5");
        assert_eq!(pkg["dependencies"]["clsx"], "latest");
        assert_eq!(pkg["devDependencies"]["tailwindcss"], "^3.4.10");
    }

    #[test]
    fn typescript_tailwind_stack_gets_matching_files() {
        let out = scaffold(&manifest());
        assert!(out.config_files.contains_key("tsconfig.json"));
        assert!(out.config_files.contains_key("vite.config.ts"));
        assert!(out.config_files.contains_key("tailwind.config.js"));
        assert!(out.boilerplate_files.contains_key("src/main.tsx"));
        assert!(out.boilerplate_files["index.html"].contains("/src/main.tsx"));
    }

    #[test]
    fn design_tokens_become_css_variables() {
        let css = &scaffold(&manifest()).boilerplate_files["src/index.css"];
        assert!(css.starts_with("@tailwind base;"));
        assert!(css.contains("--primary-color: #3355ff;"));
        assert!(css.contains("--spacing-sm: 4px;"));
        assert!(css.contains("--spacing-md: 8;"));
    }

    #[test]
    fn directories_cover_every_manifest_parent() {
        let out = scaffold(&manifest());
        assert_eq!(
            out.directories,
            vec!["public", "src", "src/components", "src/components/ui"]
        );
    }

    #[test]
    fn scaffold_is_deterministic() {
        assert_eq!(scaffold(&manifest()), scaffold(&manifest()));
    }

    #[test]
    fn javascript_stack_skips_typescript_files() {
        let mut m = manifest();
        m.tech_stack.language = "JavaScript".to_string();
        m.tech_stack.styling = None;
        let out = scaffold(&m);
        assert!(!out.config_files.contains_key("tsconfig.json"));
        assert!(!out.config_files.contains_key("tailwind.config.js"));
        assert!(out.config_files.contains_key("vite.config.js"));
        assert!(out.boilerplate_files.contains_key("src/main.jsx"));
    }
}
