//! Deterministic project-relative path normalization.
//!
//! Every path that reaches the file store goes through [`normalize_path`], so
//! generated files land in the layout the scaffold expects regardless of how a
//! generation spelled them.

const CODE_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs", "vue", "svelte", "css", "scss",
];

/// Normalize a generated path.
///
/// The result is always relative, `/`-separated and free of `.`/`..`
/// segments. Directory segments are lowercased; a file sitting directly in a
/// `components` directory is moved into `components/ui`; code file names are
/// converted to kebab-case. Normalization is idempotent.
pub fn normalize_path(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let segments: Vec<&str> = unified
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect();

    let Some((leaf, dirs)) = segments.split_last() else {
        return String::new();
    };

    let mut out: Vec<String> = dirs.iter().map(|dir| dir.to_lowercase()).collect();
    if out.last().is_some_and(|dir| dir == "components") {
        out.push("ui".to_string());
    }
    out.push(normalize_leaf(leaf));
    out.join("/")
}

/// True for extensions whose file names get kebab-cased.
pub fn is_code_file(path: &str) -> bool {
    extension_of(path).is_some_and(|ext| {
        let ext = ext.to_ascii_lowercase();
        CODE_EXTENSIONS.contains(&ext.as_str())
    })
}

/// The alternate lookup key for a path: `src/`-prefixed paths map to the
/// unprefixed form and vice versa.
pub fn alternate_src_path(path: &str) -> String {
    match path.strip_prefix("src/") {
        Some(rest) => rest.to_string(),
        None => format!("src/{path}"),
    }
}

/// Extension of the leaf segment, if the leaf has a non-empty stem.
pub fn extension_of(path: &str) -> Option<&str> {
    let leaf = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = leaf.rsplit_once('.')?;
    if stem.is_empty() { None } else { Some(ext) }
}

fn normalize_leaf(leaf: &str) -> String {
    if !is_code_file(leaf) {
        return leaf.to_string();
    }
    let Some((stem, ext)) = leaf.rsplit_once('.') else {
        return leaf.to_string();
    };
    format!("{}.{}", kebab_case(stem), ext.to_ascii_lowercase())
}

fn kebab_case(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len() + 4);
    let mut prev: Option<char> = None;
    for ch in stem.chars() {
        if ch.is_uppercase() && prev.is_some_and(|p| p != '-' && p != '.') {
            out.push('-');
        }
        out.extend(ch.to_lowercase());
        prev = Some(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_leaf_gets_ui_segment_and_kebab_case() {
        assert_eq!(
            normalize_path("src/Components/MyButton.tsx"),
            "src/components/ui/my-button.tsx"
        );
    }

    #[test]
    fn other_component_subdirectories_are_kept() {
        assert_eq!(
            normalize_path("src/components/layout/NavBar.tsx"),
            "src/components/layout/nav-bar.tsx"
        );
        assert_eq!(
            normalize_path("src/components/ui/Card.tsx"),
            "src/components/ui/card.tsx"
        );
    }

    #[test]
    fn traversal_and_separators_are_stripped() {
        assert_eq!(normalize_path("/../..\\src\\.\\App.tsx"), "src/app.tsx");
        assert_eq!(normalize_path("./src//pages/Home.jsx"), "src/pages/home.jsx");
        assert_eq!(normalize_path("../.."), "");
    }

    #[test]
    fn non_code_leaves_keep_their_case() {
        assert_eq!(normalize_path("Docs/README.md"), "docs/README.md");
        assert_eq!(normalize_path("public/Logo.SVG"), "public/Logo.SVG");
    }

    #[test]
    fn existing_hyphens_do_not_double() {
        assert_eq!(normalize_path("src/use-Auth.ts"), "src/use-auth.ts");
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "src/Components/MyButton.tsx",
            "Src\\Components\\UI\\IconButton.TSX",
            "components/Header.jsx",
            "./lib/apiClient.ts",
            "styles/Theme.CSS",
            "../etc/passwd",
            "package.json",
        ];
        for input in inputs {
            let once = normalize_path(input);
            assert_eq!(normalize_path(&once), once, "input {input}");
        }
    }

    #[test]
    fn alternate_src_path_toggles_prefix() {
        assert_eq!(alternate_src_path("src/app.tsx"), "app.tsx");
        assert_eq!(alternate_src_path("app.tsx"), "src/app.tsx");
    }
}
