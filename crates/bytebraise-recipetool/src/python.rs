use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use indexmap::IndexSet;
use itertools::Itertools;
use tracing::{debug, info};

use crate::context::RecipeContext;
use crate::deps::{scan_targets, DependencyScanner};
use crate::errors::ExtractResult;
use crate::extract::{Extraction, SetupExtractor};
use crate::fields::{BASE_PKGDEPS, EXCLUDED_PKGDEPS};
use crate::handler::{checkfiles, RecipeHandler};
use crate::introspect::SetupIntrospector;

const LICENSE_PLACEHOLDERS: &[&str] = &["LICENSE = \"Unknown\"", "LICENSE = \"CLOSED\""];

/// Recipe package name for a Python requirement.
fn requirement_package(requirement: &str) -> String {
    format!("python-{}", requirement.replace('.', "-").to_lowercase())
}

fn requirement_packages<'a, I: IntoIterator<Item = &'a String>>(requirements: I) -> String {
    requirements
        .into_iter()
        .sorted()
        .map(|r| requirement_package(r))
        .join(" ")
}

/// Fills in a recipe for a project built with `setup.py` (distutils or setuptools).
pub struct PythonRecipeHandler {
    introspector: Box<dyn SetupIntrospector>,
    scanner: Box<dyn DependencyScanner>,
    context: RecipeContext,
}

impl PythonRecipeHandler {
    pub fn new(
        introspector: Box<dyn SetupIntrospector>,
        scanner: Box<dyn DependencyScanner>,
        context: RecipeContext,
    ) -> Self {
        Self {
            introspector,
            scanner,
            context,
        }
    }

    /// Replace a placeholder `LICENSE` line with the detected license, taking it out of
    /// `bbinfo`.
    fn apply_license(
        bbinfo: &mut BTreeMap<String, String>,
        lines_before: &mut Vec<String>,
    ) {
        let snapshot = lines_before.clone();
        let mut comment_lic_line = None;

        for (pos, line) in snapshot.iter().enumerate() {
            if line.starts_with('#') && line.contains("LICENSE") {
                comment_lic_line = Some(pos);
            } else if line.starts_with("LICENSE =") && LICENSE_PLACEHOLDERS.contains(&line.as_str())
            {
                let Some(license) = bbinfo.remove("LICENSE") else {
                    continue;
                };
                lines_before[pos] = format!("LICENSE = \"{license}\"");

                if line == "LICENSE = \"CLOSED\"" {
                    if let Some(comment) = comment_lic_line.filter(|c| *c > 0) {
                        lines_before.splice(
                            comment..pos,
                            [
                                String::from("# WARNING: the following LICENSE value is a best guess - it is your"),
                                String::from("# responsibility to verify that the value is complete and correct."),
                            ],
                        );
                    }
                }
                break;
            }
        }
    }

    /// Insert the recipe variables just above the `SRC_URI` line.
    fn insert_metadata(
        bbinfo: &BTreeMap<String, String>,
        lines_before: &mut Vec<String>,
    ) {
        if bbinfo.is_empty() {
            return;
        }

        let mdinfo = std::iter::once(String::new()).chain(
            bbinfo
                .iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| format!("{k} = \"{v}\"")),
        );

        let at = lines_before
            .iter()
            .rposition(|l| l.starts_with("SRC_URI ="))
            .map(|pos| pos.saturating_sub(1))
            .unwrap_or(lines_before.len());
        lines_before.splice(at..at, mdinfo);
    }

    /// Dependency blocks appended after the `inherit` line.
    fn dependency_lines(
        &self,
        srctree: &Path,
        extraction: &Extraction,
    ) -> ExtractResult<Vec<String>> {
        let provided = self.context.provided_packages()?;
        let targets = scan_targets(&extraction.setup_info, &extraction.non_literals)
            .into_iter()
            .map(|target| srctree.join(target))
            .collect_vec();
        debug!("scanning {:?} for python imports", targets);

        let mut mapped: BTreeSet<String> = BASE_PKGDEPS.iter().map(|d| d.to_string()).collect();
        let mut unmapped = BTreeSet::new();
        for dep in self.scanner.scan(&targets) {
            match provided.get(&dep) {
                Some(package) => {
                    mapped.insert(package.clone());
                }
                None => {
                    unmapped.insert(dep);
                }
            }
        }

        let mut lines = vec![];

        let install_requires = extraction.install_requires();
        if !install_requires.is_empty() {
            for requirement in &install_requires {
                unmapped.remove(requirement);
            }
            lines.push(String::from("# WARNING: the following rdepends are from setuptools install_requires. These"));
            lines.push(String::from("# upstream names may not correspond exactly to bitbake package names."));
            lines.push(format!(
                "RDEPENDS_${{PN}} += \"{}\"",
                requirement_packages(&install_requires)
            ));
        }

        let extras_require = extraction.info.groups("Extras-require");
        if !extras_require.is_empty() {
            if !install_requires.is_empty() {
                lines.push(String::new());
            }
            lines.push(String::from("# The following configs & dependencies are from setuptools extras_require."));
            lines.push(String::from("# These dependencies are optional, hence can be controlled via PACKAGECONFIG."));
            lines.push(String::from("# The upstream names may not correspond exactly to bitbake package names."));
            lines.push(String::from("#"));
            lines.push(String::from("# Uncomment this line to enable all the optional features."));
            lines.push(format!(
                "#PACKAGECONFIG ?= \"{}\"",
                extras_require.keys().map(|k| k.to_lowercase()).join(" ")
            ));
            for (feature, requirements) in &extras_require {
                for requirement in requirements {
                    unmapped.remove(requirement);
                }
                lines.push(format!(
                    "PACKAGECONFIG[{}] = \",,,{}\"",
                    feature.to_lowercase(),
                    requirement_packages(requirements)
                ));
            }
        }

        if let Some(name) = extraction.info.name() {
            mapped.remove(name);
        }
        for excluded in EXCLUDED_PKGDEPS {
            mapped.remove(*excluded);
        }
        if !mapped.is_empty() {
            if !install_requires.is_empty() || !extras_require.is_empty() {
                lines.push(String::new());
            }
            lines.push(String::from("# WARNING: the following rdepends are determined through basic analysis of the"));
            lines.push(String::from("# python sources, and might not be 100% accurate."));
            lines.push(format!("RDEPENDS_${{PN}} += \"{}\"", mapped.iter().join(" ")));
        }

        for module in &self.context.assume_provided {
            unmapped.remove(module);
        }
        if !unmapped.is_empty() {
            if !mapped.is_empty() {
                lines.push(String::new());
            }
            lines.push(String::from("# WARNING: We were unable to map the following python package/module"));
            lines.push(String::from("# dependencies to the bitbake packages which include them:"));
            lines.extend(unmapped.iter().map(|d| format!("#    {d}")));
        }

        Ok(lines)
    }
}

impl RecipeHandler for PythonRecipeHandler {
    fn process(
        &self,
        srctree: &Path,
        classes: &mut Vec<String>,
        lines_before: &mut Vec<String>,
        lines_after: &mut Vec<String>,
        handled: &mut IndexSet<String>,
    ) -> ExtractResult<bool> {
        if handled.contains("buildsystem") {
            return Ok(false);
        }

        if checkfiles(srctree, &["setup.py"])?.is_empty() {
            return Ok(false);
        }

        // setup.py is always parsed; it tells where the sources to scan for imports are even
        // when the metadata comes from egg-info or PKG-INFO
        let extraction = SetupExtractor::new(self.introspector.as_ref()).extract(srctree)?;

        classes.push(String::from(match extraction.uses_setuptools {
            true => "setuptools",
            false => "distutils",
        }));

        let mut bbinfo = extraction.info.recipe_vars();
        Self::apply_license(&mut bbinfo, lines_before);
        Self::insert_metadata(&bbinfo, lines_before);

        let lines = self.dependency_lines(srctree, &extraction)?;
        info!("{} dependency lines for {}", lines.len(), srctree.display());
        lines_after.extend(lines);

        handled.insert(String::from("buildsystem"));
        Ok(true)
    }
}
