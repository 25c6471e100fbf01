use anyhow::Result;
use std::path::{Path, PathBuf};

use super::{Delivery, DeliveryRequest};
use crate::config::{Context, SELF_NAME};
use crate::package::now_epoch;
use crate::runtime::Runtime;

pub const WRAPPER_MARKER: &str = "# Wrapper generated by tooldrop";

/// Deliver a small shell script that triggers a background auto-upgrade, then
/// runs the source.
pub struct WrapDelivery;

/// `<meta>/<package>/.last-check`
pub fn last_check_path(ctx: &Context, package: &str) -> PathBuf {
    ctx.settings.meta_folder(package).join(".last-check")
}

/// Single-quote `text` for `/bin/sh`.
fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

fn quoted(path: &Path) -> String {
    shell_quote(&path.display().to_string())
}

/// Content of the wrapper script for `package`, delivering `source`.
pub fn wrapper_script(ctx: &Context, package: &str, source: &Path) -> String {
    let program = quoted(&ctx.program);
    let base = quoted(ctx.base());
    let upgrade = format!(
        "nohup {} --base {} auto-upgrade {} >/dev/null 2>&1 &",
        program,
        base,
        shell_quote(package)
    );
    // Running our own auto-upgrade through the wrapper must not spawn another one
    let upgrade = if package == SELF_NAME {
        format!(
            "case \"$*\" in\n    *auto-upgrade*) ;;\n    *) {} ;;\nesac",
            upgrade
        )
    } else {
        upgrade
    };

    let hint = format!(
        "{} is not installed anymore, please reinstall with: {} install -f {} (base: {})",
        source.display(),
        SELF_NAME,
        package,
        ctx.base().display()
    );

    format!(
        r#"#!/bin/sh
{marker}
if [ -x {program} ]; then
    {upgrade}
fi
if [ -x {source} ]; then
    exec {source} "$@"
fi
echo {hint} >&2
exit 1
"#,
        marker = WRAPPER_MARKER,
        program = program,
        upgrade = upgrade.replace('\n', "\n    "),
        source = quoted(source),
        hint = shell_quote(&hint),
    )
}

/// True when `path` is a script this tool generated.
pub fn is_wrapper(runtime: &dyn Runtime, path: &Path) -> bool {
    runtime
        .read_to_string(path)
        .map(|content| content.lines().take(3).any(|l| l.starts_with(WRAPPER_MARKER)))
        .unwrap_or(false)
}

impl Delivery for WrapDelivery {
    fn name(&self) -> &'static str {
        "wrap"
    }

    fn place(&self, runtime: &dyn Runtime, ctx: &Context, req: &DeliveryRequest<'_>) -> Result<()> {
        let script = wrapper_script(ctx, req.package, req.source);
        runtime.write(req.target, script.as_bytes())?;
        runtime.set_permissions(req.target, 0o755)?;

        let stamp = last_check_path(ctx, req.package);
        if let Some(parent) = stamp.parent()
            && !runtime.is_dir(parent)
        {
            runtime.create_dir_all(parent)?;
        }
        runtime.write(&stamp, now_epoch().to_string().as_bytes())
    }
}
