use vst3_host::{ClassKind, ClassDescriptor};

use super::summarize;
use crate::context::{CaseContext, CaseResult};
use crate::error::{ensure, Failure};
use crate::registry::{all_classes, Stage, Suite, TestCase};

pub fn cases() -> Vec<TestCase> {
    vec![
        TestCase::new(
            "identity.class-id",
            Suite::Identity,
            Stage::Created,
            all_classes,
            class_id,
        ),
        TestCase::new(
            "identity.metadata",
            Suite::Identity,
            Stage::Created,
            all_classes,
            metadata,
        ),
        TestCase::new(
            "identity.factory-info",
            Suite::Identity,
            Stage::Created,
            all_classes,
            factory_info,
        ),
        TestCase::new(
            "identity.controller-class",
            Suite::Identity,
            Stage::Created,
            all_classes,
            controller_class,
        ),
    ]
}

fn class_id(ctx: &mut CaseContext) -> CaseResult {
    let id = ctx.class().id;
    ensure(!id.is_nil(), || "class identifier is nil".into())?;
    ensure(!id.is_all_ones(), || "class identifier is all ones".into())
}

/// `1.2.3`, `1.0.0.42` or `2.1 beta`: dotted numeric components, optional suffix.
fn is_dotted_version(version: &str) -> bool {
    let numeric = version.split_whitespace().next().unwrap_or("");
    !numeric.is_empty()
        && numeric
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

fn metadata(ctx: &mut CaseContext) -> CaseResult {
    let class: ClassDescriptor = ctx.class().clone();
    ensure(!class.name.trim().is_empty(), || "class name is empty".into())?;
    ensure(!class.vendor.trim().is_empty(), || "class vendor is empty".into())?;
    if let ClassKind::Other(category) = class.kind() {
        return Err(Failure::contract(format!("unrecognised category `{category}`")));
    }
    if class.version.is_empty() {
        ctx.warn("class version is missing");
    } else if !is_dotted_version(&class.version) {
        ctx.warn(format!("class version `{}` is not a dotted version", class.version));
    }
    if !class.sdk_version.starts_with("VST 3") {
        ctx.warn(format!("SDK version `{}` does not start with `VST 3`", class.sdk_version));
    }
    if class.is_audio_module() && class.sub_categories.is_empty() {
        ctx.warn("audio module advertises no sub-categories");
    }
    Ok(())
}

fn is_well_formed_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let host = rest.split('/').next().unwrap_or("");
    host.contains('.') && !host.starts_with('.') && !host.ends_with('.') && !host.contains(' ')
}

fn is_well_formed_email(email: &str) -> bool {
    let email = email.strip_prefix("mailto:").unwrap_or(email);
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.ends_with('.')
                && !email.contains(' ')
        }
        None => false,
    }
}

fn factory_info(ctx: &mut CaseContext) -> CaseResult {
    let info = ctx.inspector().factory_info()?;
    let mut problems = Vec::new();
    if info.vendor.trim().is_empty() {
        problems.push("factory vendor is empty".to_string());
    }
    if info.url.is_empty() {
        ctx.note("factory advertises no URL");
    } else if !is_well_formed_url(&info.url) {
        problems.push(format!("factory URL `{}` is malformed", info.url));
    }
    if info.email.is_empty() {
        ctx.note("factory advertises no e-mail");
    } else if !is_well_formed_email(&info.email) {
        problems.push(format!("factory e-mail `{}` is malformed", info.email));
    }
    if !problems.is_empty() {
        ctx.warn(summarize(&problems));
    }
    Ok(())
}

fn controller_class(ctx: &mut CaseContext) -> CaseResult {
    let Some(controller) = ctx.instance()?.query().controller_class_id() else {
        ctx.note("component is its own edit controller");
        return Ok(());
    };
    let enumeration = ctx.inspector().enumerate()?;
    let Some(descriptor) = enumeration.find(&controller) else {
        return Err(Failure::contract(format!(
            "controller class {controller} is not advertised by the factory"
        )));
    };
    if descriptor.kind() != ClassKind::ComponentController {
        let category = descriptor.category.clone();
        ctx.warn(format!("controller class {controller} is filed under `{category}`"));
    }
    Ok(())
}
