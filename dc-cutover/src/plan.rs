//! Migration plan construction.
//!
//! [`build_plan`] is pure: the same configuration always yields the same
//! steps in the same order. Steps are later consumed once, top to bottom.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::config::{HostRole, MigrationConfig};

/// Written by the PES preparation step, read by the PES install step.
pub const PES_KEY_PATH: &str = "..\\outputs\\admt\\pes.key";

/// Stable identifier of a plan step, as used by `run --from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepId {
    ParameterSave,
    AdDiscovery,
    PromoteDc,
    FsmoTransfer,
    TrustCreate,
    SidHistoryEnable,
    ToolInstall,
    RsatInstall,
    PesPrepare,
    PesInstall,
    GroupMigrate,
    UserMigrate,
    ComputerMigrate,
    SecurityTranslate,
    FileDiscovery,
    MapGenerate,
    DestinationShareCreate,
    CopySeed,
    CopyCutover,
    NamespaceSetup,
    ReplicationSetup,
    DemoteDc,
}

impl StepId {
    pub const ALL: &'static [StepId] = &[
        StepId::ParameterSave,
        StepId::AdDiscovery,
        StepId::PromoteDc,
        StepId::FsmoTransfer,
        StepId::TrustCreate,
        StepId::SidHistoryEnable,
        StepId::ToolInstall,
        StepId::RsatInstall,
        StepId::PesPrepare,
        StepId::PesInstall,
        StepId::GroupMigrate,
        StepId::UserMigrate,
        StepId::ComputerMigrate,
        StepId::SecurityTranslate,
        StepId::FileDiscovery,
        StepId::MapGenerate,
        StepId::DestinationShareCreate,
        StepId::CopySeed,
        StepId::CopyCutover,
        StepId::NamespaceSetup,
        StepId::ReplicationSetup,
        StepId::DemoteDc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::ParameterSave => "parameter-save",
            StepId::AdDiscovery => "ad-discovery",
            StepId::PromoteDc => "promote-dc",
            StepId::FsmoTransfer => "fsmo-transfer",
            StepId::TrustCreate => "trust-create",
            StepId::SidHistoryEnable => "sid-history-enable",
            StepId::ToolInstall => "tool-install",
            StepId::RsatInstall => "rsat-install",
            StepId::PesPrepare => "pes-prepare",
            StepId::PesInstall => "pes-install",
            StepId::GroupMigrate => "group-migrate",
            StepId::UserMigrate => "user-migrate",
            StepId::ComputerMigrate => "computer-migrate",
            StepId::SecurityTranslate => "security-translate",
            StepId::FileDiscovery => "file-discovery",
            StepId::MapGenerate => "map-generate",
            StepId::DestinationShareCreate => "destination-share-create",
            StepId::CopySeed => "copy-seed",
            StepId::CopyCutover => "copy-cutover",
            StepId::NamespaceSetup => "namespace-setup",
            StepId::ReplicationSetup => "replication-setup",
            StepId::DemoteDc => "demote-dc",
        }
    }
}

impl Display for StepId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown step id: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub id: StepId,
    pub name: String,
    pub executable: PathBuf,
    pub args: Vec<String>,
    /// Reported by `plan` and `validate`; a run skips any missing script.
    pub optional: bool,
}

impl Step {
    fn new(id: StepId, name: &str, executable: PathBuf, optional: bool) -> Self {
        Self {
            id,
            name: name.to_string(),
            executable,
            args: Vec::new(),
            optional,
        }
    }

    fn arg(mut self, flag: &str, value: impl Into<String>) -> Self {
        self.args.push(flag.to_string());
        self.args.push(value.into());
        self
    }

    fn flag(mut self, flag: &str) -> Self {
        self.args.push(flag.to_string());
        self
    }

    pub fn args_display(&self) -> String {
        self.args.join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    steps: Vec<Step>,
}

impl MigrationPlan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn position(&self, id: StepId) -> Option<usize> {
        self.steps.iter().position(|step| step.id == id)
    }

    pub fn ids(&self) -> Vec<StepId> {
        self.steps.iter().map(|step| step.id).collect()
    }
}

pub fn build_plan(config: &MigrationConfig) -> MigrationPlan {
    let scripts = config.files.scripts_dir();
    let cross = config.files.cross_domain_dir();
    let hosts = &config.hosts;
    let mode = &config.mode;
    let source_domain = config.domain_for(HostRole::Source);
    let target_domain = config.domain_for(HostRole::Target);

    let mut steps = vec![Step::new(
        StepId::ParameterSave,
        "Save parameters",
        script(&scripts, "00-Write-Parameters.ps1"),
        false,
    )
    .arg("-DomainName", target_domain)
    .arg("-OldDCHostname", &hosts.source_dc)
    .arg("-NewDCHostname", &hosts.target_dc)
    .arg("-SourceFileServer", &hosts.source_file_server)
    .arg("-DestinationFileServer", &hosts.destination_file_server)
    .arg("-DestinationRootPath", &config.files.destination_root)];

    if mode.same_domain {
        steps.push(Step::new(
            StepId::AdDiscovery,
            "Directory discovery",
            script(&scripts, "01-Discovery-AD.ps1"),
            true,
        ));
        steps.push(Step::new(
            StepId::PromoteDc,
            "Promote new controller",
            script(&scripts, "10-Promote-New-DC.ps1"),
            false,
        ));
        steps.push(Step::new(
            StepId::FsmoTransfer,
            "Transfer FSMO roles",
            script(&scripts, "20-Transfer-FSMO.ps1"),
            false,
        ));
    } else {
        let domains = |step: Step| {
            step.arg("-SourceDomain", source_domain)
                .arg("-TargetDomain", target_domain)
        };
        steps.push(domains(Step::new(
            StepId::TrustCreate,
            "Create trust",
            script(&cross, "Create-Trust.ps1"),
            false,
        )));
        steps.push(domains(Step::new(
            StepId::SidHistoryEnable,
            "Enable SID history",
            script(&cross, "Enable-SIDHistory.ps1"),
            false,
        )));
        steps.push(Step::new(
            StepId::ToolInstall,
            "Install migration tool",
            script(&cross, "ADMT-Install.ps1"),
            true,
        ));
        steps.push(Step::new(
            StepId::RsatInstall,
            "Install directory tools on target",
            script(&cross, "Install-RSAT-AD.ps1"),
            true,
        ));
        steps.push(
            domains(Step::new(
                StepId::PesPrepare,
                "Prepare password export key",
                script(&cross, "ADMT-Prepare-PES.ps1"),
                false,
            ))
            .arg("-KeyFilePath", PES_KEY_PATH),
        );
        if !hosts.source_dc.trim().is_empty() {
            steps.push(
                Step::new(
                    StepId::PesInstall,
                    "Install password export on source controller",
                    script(&cross, "PES-Install.ps1"),
                    true,
                )
                .arg("-SourcePDC", hosts.source_dc.trim())
                .arg("-KeyFilePath", PES_KEY_PATH),
            );
        }
        steps.push(domains(Step::new(
            StepId::GroupMigrate,
            "Migrate groups",
            script(&cross, "ADMT-Migrate-Groups.ps1"),
            false,
        )));
        steps.push(domains(Step::new(
            StepId::UserMigrate,
            "Migrate users",
            script(&cross, "ADMT-Migrate-Users.ps1"),
            false,
        )));
        steps.push(domains(Step::new(
            StepId::ComputerMigrate,
            "Migrate computers",
            script(&cross, "ADMT-Migrate-Computers.ps1"),
            false,
        )));
        steps.push(
            domains(Step::new(
                StepId::SecurityTranslate,
                "Translate security",
                script(&cross, "ADMT-Translate-Security.ps1"),
                false,
            ))
            .arg("-Mode", "Add"),
        );
    }

    if mode.copy_files {
        let maps = config.files.maps_csv().display().to_string();
        steps.push(
            Step::new(
                StepId::FileDiscovery,
                "File share discovery",
                script(&scripts, "02-Discovery-FileShares.ps1"),
                true,
            )
            .arg("-ComputerName", &hosts.source_file_server),
        );
        steps.push(Step::new(
            StepId::MapGenerate,
            "Generate share maps",
            script(&scripts, "24-Generate-Maps.ps1"),
            true,
        ));
        steps.push(Step::new(
            StepId::DestinationShareCreate,
            "Create destination shares",
            script(&scripts, "25-Create-Destination-Shares.ps1"),
            true,
        ));
        steps.push(
            Step::new(
                StepId::CopySeed,
                "Seed copy",
                script(&scripts, "30-Robocopy-Migrate.ps1"),
                false,
            )
            .arg("-CsvMapPath", maps.clone())
            .flag("-NoPreCopy:$false"),
        );
        if mode.cutover_pass {
            steps.push(
                Step::new(
                    StepId::CopyCutover,
                    "Cutover copy (mirrors deletions)",
                    script(&scripts, "30-Robocopy-Migrate.ps1"),
                    false,
                )
                .arg("-CsvMapPath", maps)
                .flag("-NoPreCopy:$true"),
            );
        }
    }

    if mode.namespace {
        let namespace = format!("\\\\{}\\{}", target_domain, config.files.namespace_folder);
        let mut step = Step::new(
            StepId::NamespaceSetup,
            "Namespace setup",
            script(&cross, "DFSN-Setup.ps1"),
            true,
        )
        .arg("-NamespacePath", namespace);
        let roots: Vec<&str> = [&hosts.source_file_server, &hosts.destination_file_server]
            .into_iter()
            .map(|host| host.trim())
            .filter(|host| !host.is_empty())
            .collect();
        if !roots.is_empty() {
            step = step.arg("-RootTargets", roots.join(","));
        }
        steps.push(step);
    }
    if mode.replication {
        steps.push(Step::new(
            StepId::ReplicationSetup,
            "Replication setup",
            script(&cross, "DFSR-Setup.ps1"),
            true,
        ));
    }

    if mode.same_domain {
        steps.push(Step::new(
            StepId::DemoteDc,
            "Demote old controller",
            script(&scripts, "40-Demote-Old-DC.ps1"),
            false,
        ));
    }

    MigrationPlan::new(steps)
}

fn script(dir: &Path, file: &str) -> PathBuf {
    dir.join(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cross_domain_config() -> MigrationConfig {
        let mut config = MigrationConfig::default();
        config.domains.source = "old.corp".into();
        config.domains.target = "new.corp".into();
        config.mode.copy_files = true;
        config.mode.namespace = true;
        config
    }

    #[test]
    fn cross_domain_plan_without_source_host() {
        let plan = build_plan(&cross_domain_config());
        assert_eq!(
            plan.ids(),
            vec![
                StepId::ParameterSave,
                StepId::TrustCreate,
                StepId::SidHistoryEnable,
                StepId::ToolInstall,
                StepId::RsatInstall,
                StepId::PesPrepare,
                StepId::GroupMigrate,
                StepId::UserMigrate,
                StepId::ComputerMigrate,
                StepId::SecurityTranslate,
                StepId::FileDiscovery,
                StepId::MapGenerate,
                StepId::DestinationShareCreate,
                StepId::CopySeed,
                StepId::NamespaceSetup,
            ]
        );
    }

    #[test]
    fn pes_install_follows_prepare_when_source_host_set() {
        let mut config = cross_domain_config();
        config.hosts.source_dc = "dc01".into();
        let plan = build_plan(&config);
        let prepare = plan.position(StepId::PesPrepare).expect("prepare");
        assert_eq!(plan.position(StepId::PesInstall), Some(prepare + 1));
        let install = plan.iter().nth(prepare + 1).expect("install");
        assert_eq!(
            install.args_display(),
            "-SourcePDC dc01 -KeyFilePath ..\\outputs\\admt\\pes.key"
        );
    }

    #[test]
    fn same_domain_plan_ends_with_demotion() {
        let mut config = MigrationConfig::default();
        config.domains.source = "corp.local".into();
        config.mode.same_domain = true;
        config.mode.replication = true;
        let plan = build_plan(&config);
        assert_eq!(
            plan.ids(),
            vec![
                StepId::ParameterSave,
                StepId::AdDiscovery,
                StepId::PromoteDc,
                StepId::FsmoTransfer,
                StepId::ReplicationSetup,
                StepId::DemoteDc,
            ]
        );
        let save = plan.iter().next().expect("first");
        assert_eq!(save.args[0..2], ["-DomainName".to_string(), "corp.local".to_string()]);
    }

    #[test]
    fn cutover_pass_adds_mirroring_copy() {
        let mut config = cross_domain_config();
        config.mode.cutover_pass = true;
        let plan = build_plan(&config);
        let seed = plan.position(StepId::CopySeed).expect("seed");
        assert_eq!(plan.position(StepId::CopyCutover), Some(seed + 1));
        let cutover = plan.iter().nth(seed + 1).expect("cutover");
        assert!(cutover.args.contains(&"-NoPreCopy:$true".to_string()));
    }

    #[test]
    fn same_config_same_plan() {
        let config = cross_domain_config();
        assert_eq!(build_plan(&config), build_plan(&config));
    }

    #[test]
    fn namespace_lists_known_root_targets() {
        let mut config = cross_domain_config();
        config.hosts.destination_file_server = "fs02".into();
        let plan = build_plan(&config);
        let step = plan
            .iter()
            .find(|step| step.id == StepId::NamespaceSetup)
            .expect("namespace");
        assert_eq!(
            step.args,
            vec![
                "-NamespacePath".to_string(),
                "\\\\new.corp\\Files".to_string(),
                "-RootTargets".to_string(),
                "fs02".to_string(),
            ]
        );
    }

    #[test]
    fn step_ids_parse_back() {
        for id in StepId::ALL {
            assert_eq!(id.as_str().parse::<StepId>(), Ok(*id));
        }
        assert!("reboot".parse::<StepId>().is_err());
    }
}
