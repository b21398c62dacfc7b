use crate::analyzer::audit::{AuditContext, Checker};
use crate::analyzer::resource::Resource;
use crate::analyzer::types::{AuditResult, Code, Occurrence, meta};

/// Tag of an image reference, ignoring any digest and registry port.
pub fn image_tag(image: &str) -> Option<&str> {
    let name = image.split('@').next().unwrap_or(image);
    let last_segment = name.rsplit('/').next().unwrap_or(name);
    last_segment
        .split_once(':')
        .map(|(_, tag)| tag)
        .filter(|tag| !tag.is_empty())
}

/// Images must be pinned to a tag other than `latest`.
pub struct ImageTag;

impl Checker for ImageTag {
    fn name(&self) -> &'static str {
        "image"
    }

    fn description(&self) -> &'static str {
        "Containers using an untagged or latest image"
    }

    fn audit(&self, resource: &Resource, _ctx: &AuditContext<'_>, result: &mut AuditResult) {
        let Some(workload) = resource.workload() else {
            return;
        };
        for container in workload.containers() {
            let image = container.image.as_deref().unwrap_or_default();
            let pinned_by_digest = image.contains('@');
            let occurrence = match image_tag(image) {
                None if pinned_by_digest => continue,
                None => Occurrence::new(Code::ImageTagMissing, format!("Image {image} has no tag")),
                Some("latest") => {
                    Occurrence::new(Code::ImageTagLatest, format!("Image {image} uses the latest tag"))
                }
                Some(_) => continue,
            };
            result.push(
                occurrence
                    .with_subject(&container.name)
                    .with_metadata(meta::IMAGE, image),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::checks::testing::{audit_yaml, pod_with_container};

    #[test]
    fn test_image_tag_parsing() {
        assert_eq!(image_tag("nginx"), None);
        assert_eq!(image_tag("nginx:1.25"), Some("1.25"));
        assert_eq!(image_tag("registry:5000/team/app"), None);
        assert_eq!(image_tag("registry:5000/team/app:v2"), Some("v2"));
        assert_eq!(image_tag("app@sha256:abc"), None);
    }

    #[test]
    fn test_findings() {
        let tagged = audit_yaml(&ImageTag, &pod_with_container(""));
        assert!(tagged.is_empty());

        let latest = audit_yaml(&ImageTag, &pod_with_container("").replace("nginx:1.25", "nginx:latest"));
        assert_eq!(latest.codes(), vec![Code::ImageTagLatest]);

        let bare = audit_yaml(&ImageTag, &pod_with_container("").replace("nginx:1.25", "nginx"));
        assert_eq!(bare.codes(), vec![Code::ImageTagMissing]);
        assert_eq!(bare.occurrences[0].metadata(meta::IMAGE), Some("nginx"));
    }
}
