// src/patch/rules.rs

//! Stock rules for the target application's `main.js`

use super::PatchRule;

/// Hook loader, module-table wrapper, window hook and preload injection
pub fn default_rules() -> Vec<PatchRule> {
    vec![
        PatchRule::prepend("const hook = require(\"./hook.js\");\n"),
        PatchRule::replace_first(
            "n.m=e",
            ";const zeron = require(\"./zeron.js\");n = zeron(n);n.m=e",
        ),
        PatchRule::replace_first(
            "let f=new s(Object.assign({},{transparent:!0,",
            ";hook({ central: n, windowName: this.wname, config: c });let f=new s(Object.assign({},{transparent:!0,",
        ),
        PatchRule::replace_first(
            "c.canOpenDevTool",
            r#"c.canOpenDevTool,preload: __dirname + "\\preload.js""#,
        ),
    ]
}
