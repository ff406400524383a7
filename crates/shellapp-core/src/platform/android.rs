//! Android shell app template

use super::{AssetLayout, PlatformProfile, TemplateEntry};
use crate::patch::{Condition, Escape, Guard, PatchContext, PatchOperation};

pub const ANDROID_MANIFEST: &str = "app/src/main/AndroidManifest.xml";
pub const APP_BUILD_GRADLE: &str = "app/build.gradle";
pub const GOOGLE_SERVICES: &str = "app/google-services.json";
pub const CONSTANTS_JAVA: &str = "app/src/main/java/host/exp/exponent/Constants.java";
pub const STRINGS_XML: &str = "app/src/main/res/values/strings.xml";

/// Package identifier the template ships with
pub const TEMPLATE_PACKAGE: &str = "host.exp.exponent";

const TEMPLATE_ENTRIES: &[TemplateEntry] = &[
    TemplateEntry::dir("ReactCommon"),
    TemplateEntry::dir("ReactAndroid"),
    TemplateEntry::dir("Android-Image-Cropper"),
    TemplateEntry::file("android.iml"),
    TemplateEntry::dir("app"),
    TemplateEntry::file("build.gradle"),
    TemplateEntry::dir("gradle"),
    TemplateEntry::file("gradle.properties"),
    TemplateEntry::file("gradlew"),
    TemplateEntry::file("local.properties"),
    TemplateEntry::file("settings.gradle"),
];

const INTENT_FILTER: &str = r#"<intent-filter>
        <data android:scheme="{{scheme}}"/>

        <action android:name="android.intent.action.VIEW"/>

        <category android:name="android.intent.category.DEFAULT"/>
        <category android:name="android.intent.category.BROWSABLE"/>
      </intent-filter>"#;

const CRASH_REPORTING_META_DATA: &str = r#"<meta-data
      android:name="io.fabric.ApiKey"
      android:value="{{crash_api_key}}"/>"#;

const EMBEDDED_RESPONSES: &str = r#"
    embeddedResponses.add(new EmbeddedResponse("{{manifest_url}}", "assets://shell-app-manifest.json", "application/json"));
    embeddedResponses.add(new EmbeddedResponse("{{bundle_url}}", "assets://shell-app.bundle", "application/javascript"));"#;

/// The Android template profile
#[derive(Debug, Clone, Copy, Default)]
pub struct Android;

impl PlatformProfile for Android {
    fn name(&self) -> &'static str {
        "android"
    }

    fn display_name(&self) -> &'static str {
        "Android"
    }

    fn template_entries(&self) -> &'static [TemplateEntry] {
        TEMPLATE_ENTRIES
    }

    fn stale_paths(&self) -> &'static [&'static str] {
        &["app/build"]
    }

    fn assets(&self) -> AssetLayout {
        AssetLayout {
            manifest_json: "app/src/main/assets/shell-app-manifest.json",
            bundle: "app/src/main/assets/shell-app.bundle",
            resources: "app/src/main/res",
            icon_file: "ic_launcher.png",
            icon_dir: "mipmap-hdpi",
            notification_icon_file: "shell_notification_icon.png",
            notification_icon_dir: "drawable-hdpi",
            crash_reporting_properties: "app/fabric.properties",
        }
    }

    fn build_task(&self) -> &'static str {
        "assembleProdRelease"
    }

    fn build_output(&self) -> &'static str {
        "app/build/outputs/apk/app-prod-release-unsigned.apk"
    }

    fn operations(&self, _ctx: &PatchContext) -> Vec<PatchOperation> {
        let mut ops = Vec::new();
        ops.extend(manifest_operations());
        ops.extend(build_config_operations());
        ops.extend(source_constant_operations());
        ops.extend(resource_operations());
        ops
    }
}

/// AndroidManifest.xml: identity, deep links, crash reporting
fn manifest_operations() -> Vec<PatchOperation> {
    vec![
        PatchOperation::replace(
            "manifest-package",
            ANDROID_MANIFEST,
            r#"android:name="host.exp.exponent""#,
            r#"android:name="{{package}}""#,
        )
        .all()
        .escaped(Escape::Xml),
        PatchOperation::replace(
            "c2dm-permission",
            ANDROID_MANIFEST,
            "host.exp.exponent.permission.C2D_MESSAGE",
            "{{package}}.permission.C2D_MESSAGE",
        )
        .all()
        .escaped(Escape::Xml),
        PatchOperation::remove_block(
            "dev-scheme",
            ANDROID_MANIFEST,
            "DELETE AFTER",
            "DELETE BEFORE",
        ),
        // The marker is consumed by exactly one of the next two operations.
        PatchOperation::replace(
            "shell-scheme",
            ANDROID_MANIFEST,
            "<!-- ADD SHELL SCHEME HERE -->",
            INTENT_FILTER,
        )
        .escaped(Escape::Xml)
        .guarded(Guard::When(Condition::Scheme)),
        PatchOperation::remove(
            "shell-scheme-marker",
            ANDROID_MANIFEST,
            "<!-- ADD SHELL SCHEME HERE -->",
        )
        .best_effort()
        .guarded(Guard::Unless(Condition::Scheme)),
        PatchOperation::remove_block(
            "crash-reporting-boilerplate",
            ANDROID_MANIFEST,
            "BEGIN FABRIC CONFIG",
            "END FABRIC CONFIG",
        ),
        PatchOperation::replace(
            "crash-reporting",
            ANDROID_MANIFEST,
            "<!-- ADD FABRIC CONFIG HERE -->",
            CRASH_REPORTING_META_DATA,
        )
        .escaped(Escape::Xml)
        .guarded(Guard::When(Condition::CrashReporting)),
        PatchOperation::remove(
            "crash-reporting-marker",
            ANDROID_MANIFEST,
            "<!-- ADD FABRIC CONFIG HERE -->",
        )
        .best_effort()
        .guarded(Guard::Unless(Condition::CrashReporting)),
    ]
}

/// Gradle scripts and push notification config
fn build_config_operations() -> Vec<PatchOperation> {
    vec![
        PatchOperation::replace(
            "application-id",
            APP_BUILD_GRADLE,
            "applicationId 'host.exp.exponent'",
            "applicationId '{{package}}'",
        ),
        PatchOperation::remove(
            "dynamic-macros",
            APP_BUILD_GRADLE,
            "preBuild.dependsOn generateDynamicMacros",
        ),
        PatchOperation::replace(
            "java-max-heap",
            APP_BUILD_GRADLE,
            r#"javaMaxHeapSize "8g""#,
            r#"javaMaxHeapSize "6g""#,
        ),
        PatchOperation::replace(
            "push-package-name",
            GOOGLE_SERVICES,
            r#""package_name": "host.exp.exponent""#,
            r#""package_name": "{{package}}""#,
        )
        .all(),
    ]
}

/// Constants.java: entry point and embedded responses
fn source_constant_operations() -> Vec<PatchOperation> {
    vec![
        PatchOperation::replace(
            "initial-url",
            CONSTANTS_JAVA,
            "INITIAL_URL = null",
            r#"INITIAL_URL = "{{initial_url}}""#,
        )
        .escaped(Escape::JavaString),
        PatchOperation::replace(
            "shell-app-scheme",
            CONSTANTS_JAVA,
            "SHELL_APP_SCHEME = null",
            r#"SHELL_APP_SCHEME = "{{scheme}}""#,
        )
        .escaped(Escape::JavaString)
        .guarded(Guard::When(Condition::Scheme)),
        PatchOperation::replace(
            "embedded-responses",
            CONSTANTS_JAVA,
            "// ADD EMBEDDED RESPONSES HERE",
            EMBEDDED_RESPONSES,
        )
        .escaped(Escape::JavaString),
    ]
}

fn resource_operations() -> Vec<PatchOperation> {
    vec![PatchOperation::replace(
        "app-name",
        STRINGS_XML,
        r#""app_name">Exponent"#,
        r#""app_name">{{name}}"#,
    )
    .escaped(Escape::Xml)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{apply_to_text, Cardinality};
    use std::path::Path;

    const MANIFEST_TEMPLATE: &str = r#"<manifest package="host.exp.exponent">
  <permission android:name="host.exp.exponent.permission.C2D_MESSAGE"/>
  <application android:name="host.exp.exponent">
    <!-- BEGIN FABRIC CONFIG -->
    <meta-data android:name="io.fabric.ApiKey" android:value="template-key"/>
    <!-- END FABRIC CONFIG -->
    <!-- ADD FABRIC CONFIG HERE -->
    <activity android:name=".MainActivity">
      <intent-filter>
        <!-- DELETE AFTER -->
        <data android:scheme="exp"/>
        <!-- DELETE BEFORE -->
      </intent-filter>
      <!-- ADD SHELL SCHEME HERE -->
    </activity>
  </application>
</manifest>
"#;

    fn run_manifest_ops(ctx: &PatchContext) -> String {
        let mut text = MANIFEST_TEMPLATE.to_string();
        for op in manifest_operations() {
            if op.guard.allows(ctx) {
                text = apply_to_text(&text, &op, ctx, Path::new(ANDROID_MANIFEST))
                    .unwrap()
                    .0;
            }
        }
        text
    }

    fn base_ctx() -> PatchContext {
        PatchContext::new().with_value("package", "com.example.weather")
    }

    #[test]
    fn test_operations_are_ordered_by_category() {
        let ops = Android.operations(&base_ctx());
        let files: Vec<&str> = ops.iter().map(|op| op.file).collect();
        let first_gradle = files.iter().position(|f| *f == APP_BUILD_GRADLE).unwrap();
        let last_manifest = files.iter().rposition(|f| *f == ANDROID_MANIFEST).unwrap();
        let first_constants = files.iter().position(|f| *f == CONSTANTS_JAVA).unwrap();
        let strings = files.iter().position(|f| *f == STRINGS_XML).unwrap();
        assert!(last_manifest < first_gradle);
        assert!(first_gradle < first_constants);
        assert!(first_constants < strings);
    }

    #[test]
    fn test_identity_patches_are_strict() {
        let ops = Android.operations(&base_ctx());
        let app_id = ops.iter().find(|op| op.label == "application-id").unwrap();
        assert_eq!(app_id.cardinality, Cardinality::ExactlyOne);
        let name = ops.iter().find(|op| op.label == "app-name").unwrap();
        assert_eq!(name.cardinality, Cardinality::ExactlyOne);
    }

    #[test]
    fn test_scheme_inserts_single_intent_filter() {
        let ctx = base_ctx()
            .with_value("scheme", "weather")
            .with_condition(Condition::Scheme, true);
        let out = run_manifest_ops(&ctx);

        assert_eq!(out.matches(r#"android:scheme="weather""#).count(), 1);
        assert!(!out.contains("ADD SHELL SCHEME HERE"));
        assert!(!out.contains(r#"android:scheme="exp""#));
        assert!(out.contains(r#"android:name="com.example.weather""#));
        assert!(out.contains("com.example.weather.permission.C2D_MESSAGE"));
    }

    #[test]
    fn test_no_scheme_removes_marker_without_intent_filter() {
        let out = run_manifest_ops(&base_ctx());
        assert!(!out.contains("ADD SHELL SCHEME HERE"));
        assert!(!out.contains("android.intent.action.VIEW"));
        // The template's own intent-filter wrapper remains; no new one is added.
        assert_eq!(out.matches("<intent-filter>").count(), 1);
    }

    #[test]
    fn test_crash_reporting_absent_strips_boilerplate() {
        let out = run_manifest_ops(&base_ctx());
        assert!(!out.contains("io.fabric.ApiKey"));
        assert!(!out.contains("ADD FABRIC CONFIG HERE"));
        assert!(!out.contains("FABRIC CONFIG"));
    }

    #[test]
    fn test_crash_reporting_present_inserts_key() {
        let ctx = base_ctx()
            .with_value("crash_api_key", "abc123")
            .with_condition(Condition::CrashReporting, true);
        let out = run_manifest_ops(&ctx);
        assert_eq!(out.matches("io.fabric.ApiKey").count(), 1);
        assert!(out.contains(r#"android:value="abc123""#));
        assert!(!out.contains("template-key"));
    }
}
