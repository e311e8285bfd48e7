use camino::Utf8PathBuf;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::manifest::{INSTALLABLE_EXTENSIONS, UpdateManifest, package_files};
use super::outcome::{BatchSummary, OperationOutcome, parse_pending_updates};
use super::process::{CommandSpec, ProcessError, ProcessOutput, ProcessRunner};
use super::progress::{ProgressPlan, ProgressSynth};
use super::OperationError;
use crate::models::{
    CATEGORY_DOTNET, CATEGORY_OFFICE, CATEGORY_VCREDIST, CATEGORY_WINDOWS, ModuleAvailability,
};
use crate::state::{OperationContext, OperationGate};

/// PowerShell module that provides the Windows Update cmdlets.
pub const UPDATE_MODULE: &str = "PSWindowsUpdate";

/// Windows Update result code for "no updates found".
pub const NO_UPDATES_CODE: &str = "0x80240024";

/// `wusa`/DISM exit code for a package that is already installed (0x240006).
pub const ALREADY_INSTALLED_EXIT: i32 = 2_359_302;

/// winget exit code for "no applicable upgrade" (0x8A15002B).
pub const WINGET_NO_UPGRADE_EXIT: i32 = 0x8A15_002B_u32 as i32;

/// Scan output lines echoed to the log before eliding the rest.
pub const SCAN_PREVIEW_LINES: usize = 50;

const REBOOT_DELAY_SECS: u32 = 30;
const WINGET_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);
const WINGET_LIST_TIMEOUT: Duration = Duration::from_secs(60);
const REBOOT_TIMEOUT: Duration = Duration::from_secs(30);

const MODULE_CHECK_SCRIPT: &str = "
    Get-Module -ListAvailable -Name PSWindowsUpdate | Select-Object -First 1 | Format-List
";

const MODULE_INSTALL_SCRIPT: &str = "
    try {
        [Net.ServicePointManager]::SecurityProtocol = [Net.SecurityProtocolType]::Tls12
        $nuget = Get-PackageProvider -Name NuGet -ListAvailable -ErrorAction SilentlyContinue
        if (-not $nuget) {
            Install-PackageProvider -Name NuGet -MinimumVersion 2.8.5.201 -Force -Confirm:$false
        }
        if (-not (Get-Module -ListAvailable -Name PSWindowsUpdate)) {
            Install-Module -Name PSWindowsUpdate -Force -Confirm:$false -Scope AllUsers
        }
        Import-Module PSWindowsUpdate -ErrorAction Stop
        Write-Output 'SUCCESS: Module installed and imported'
    }
    catch {
        Write-Error $_.Exception.Message
        exit 1
    }
";

const SCAN_SCRIPT: &str = "
    Import-Module PSWindowsUpdate -ErrorAction Stop
    $updates = Get-WUList -MicrosoftUpdate -Verbose
    if ($updates) {
        $updates | Format-Table -Property Title, KB, Size, Status -AutoSize | Out-String -Width 200
    } else {
        Write-Output 'No updates available'
    }
";

const DOWNLOAD_SCRIPT: &str = "
    Import-Module PSWindowsUpdate -ErrorAction Stop
    $downloadPath = '__DOWNLOAD_DIR__'
    $updates = Get-WUList -MicrosoftUpdate
    if ($updates) {
        Write-Output \"Found $($updates.Count) updates to download\"
        foreach ($update in $updates) {
            try {
                Write-Output \"Downloading: $($update.Title)\"
                $update | Save-WUUpdates -DirectoryPath $downloadPath
            }
            catch {
                Write-Warning \"Failed to download: $($update.Title)\"
            }
        }
        Write-Output 'Download complete'
    } else {
        Write-Output 'No updates to download'
    }
";

const PENDING_LIST_SCRIPT: &str = "
    Import-Module PSWindowsUpdate -ErrorAction Stop
    $updates = Get-WUList -MicrosoftUpdate
    if ($updates) {
        $updates | Select-Object Title, KB, Size, Status | ConvertTo-Json -Depth 2
    }
";

const INSTALL_ONLINE_SCRIPT: &str = "
    Import-Module PSWindowsUpdate -ErrorAction Stop
    Install-WindowsUpdate -MicrosoftUpdate -AcceptAll __REBOOT__ -Confirm:$false
";

const DOTNET_SCRIPT: &str = "
    Import-Module PSWindowsUpdate -ErrorAction Stop
    $updates = Get-WUList -MicrosoftUpdate | Where-Object {
        $_.Title -match '\\.NET' -or $_.Title -match 'Framework'
    }
    if ($updates) {
        Write-Output \"Found $($updates.Count) .NET updates:\"
        $updates | ForEach-Object { Write-Output \"  - $($_.Title)\" }
        Write-Output 'Installing .NET updates...'
        Install-WindowsUpdate -Updates $updates -AcceptAll -Confirm:$false
        Write-Output 'Installation complete'
    } else {
        Write-Output 'No .NET updates available'
    }
";

const VCREDIST_SCRIPT: &str = "
    $ProgressPreference = 'SilentlyContinue'
    $url = '__URL__'
    $output = Join-Path $env:TEMP 'vc_redist.__ARCH__.exe'
    try {
        Invoke-WebRequest -Uri $url -OutFile $output -UseBasicParsing
        $proc = Start-Process -FilePath $output -ArgumentList '/install', '/quiet', '/norestart' -Wait -PassThru
        Remove-Item $output -Force -ErrorAction SilentlyContinue
        exit $proc.ExitCode
    }
    catch {
        Write-Error \"Failed to download/install __ARCH__: $_\"
        exit 1
    }
";

/// Visual C++ redistributable download locations by architecture.
const VCREDIST_SOURCES: [(&str, &str); 3] = [
    ("x64", "https://aka.ms/vs/17/release/vc_redist.x64.exe"),
    ("x86", "https://aka.ms/vs/17/release/vc_redist.x86.exe"),
    ("ARM64", "https://aka.ms/vs/17/release/vc_redist.arm64.exe"),
];

/// Places the Office Click-to-Run client is installed to.
pub const OFFICE_CLIENT_PATHS: [&str; 3] = [
    r"C:\Program Files\Common Files\Microsoft Shared\ClickToRun\OfficeC2RClient.exe",
    r"C:\Program Files (x86)\Common Files\Microsoft Shared\ClickToRun\OfficeC2RClient.exe",
    r"C:\Program Files\Microsoft Office\root\Office16\OfficeC2RClient.exe",
];

/// Quote for a single-quoted PowerShell string literal.
fn ps_quote(text: &str) -> String {
    text.replace('\'', "''")
}

/// Every operation the user can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    ModuleCheck,
    Scan,
    Download,
    InstallOnline,
    InstallOffline,
    UpdateOffice,
    UpdateDotnet,
    UpdateVcRedist,
}

impl OperationKind {
    pub fn label(self) -> &'static str {
        match self {
            OperationKind::ModuleCheck => "Module check",
            OperationKind::Scan => "Check for updates",
            OperationKind::Download => "Download updates",
            OperationKind::InstallOnline => "Install online",
            OperationKind::InstallOffline => "Install from repository",
            OperationKind::UpdateOffice => "Office update",
            OperationKind::UpdateDotnet => ".NET update",
            OperationKind::UpdateVcRedist => "VC++ update",
        }
    }

    /// Settings category that must be enabled for this operation to run.
    pub fn category(self) -> Option<&'static str> {
        match self {
            OperationKind::ModuleCheck => None,
            OperationKind::Scan
            | OperationKind::Download
            | OperationKind::InstallOnline
            | OperationKind::InstallOffline => Some(CATEGORY_WINDOWS),
            OperationKind::UpdateOffice => Some(CATEGORY_OFFICE),
            OperationKind::UpdateDotnet => Some(CATEGORY_DOTNET),
            OperationKind::UpdateVcRedist => Some(CATEGORY_VCREDIST),
        }
    }
}

/// The update workflows. Each runs inside an [`OperationContext`] handed out
/// by the gate and talks to the OS only through a [`ProcessRunner`].
pub struct UpdateOperations {
    process: Arc<dyn ProcessRunner>,
    plan: ProgressPlan,
    office_client_paths: Vec<Utf8PathBuf>,
    arm64_host: bool,
    kb_pattern: Regex,
}

impl UpdateOperations {
    pub fn new(process: Arc<dyn ProcessRunner>) -> Self {
        Self {
            process,
            plan: ProgressPlan::default(),
            office_client_paths: OFFICE_CLIENT_PATHS.iter().map(Utf8PathBuf::from).collect(),
            arm64_host: std::env::consts::ARCH == "aarch64",
            kb_pattern: Regex::new(r"\bKB\d{6,8}\b").expect("Invalid KB regex"),
        }
    }

    pub fn with_progress_plan(mut self, plan: ProgressPlan) -> Self {
        self.plan = plan;
        self
    }

    /// Override where the Office client is looked for.
    pub fn with_office_client_paths(mut self, paths: Vec<Utf8PathBuf>) -> Self {
        self.office_client_paths = paths;
        self
    }

    pub fn with_arm64_host(mut self, arm64: bool) -> Self {
        self.arm64_host = arm64;
        self
    }

    /// Submit `kind` to the gate.
    ///
    /// # Errors
    /// Passes through the gate's rejection when another operation is running.
    pub fn launch(
        self: &Arc<Self>,
        gate: &OperationGate,
        kind: OperationKind,
    ) -> Result<JoinHandle<()>, OperationError> {
        let operations = Arc::clone(self);
        gate.run_exclusive(kind.label(), move |ctx| async move {
            operations.run(kind, &ctx).await.map(|_| ())
        })
    }

    /// Run `kind` to completion and report it.
    ///
    /// On success the outcome's summary line is logged and progress finishes
    /// at 100 before resetting. Errors are returned untouched; the gate
    /// reports them.
    pub async fn run(
        &self,
        kind: OperationKind,
        ctx: &OperationContext,
    ) -> Result<OperationOutcome, OperationError> {
        let mut progress = ProgressSynth::new(ctx.events.clone(), self.plan.clone());
        ctx.events.status(format!("{}...", kind.label()));

        let outcome = match kind.category() {
            Some(category) if !ctx.settings.category_enabled(category) => {
                OperationOutcome::Skipped {
                    reason: format!("{} is disabled in settings.", kind.label()),
                }
            }
            _ => match kind {
                OperationKind::ModuleCheck => self.check_module(ctx).await?,
                OperationKind::Scan => self.scan(ctx, &mut progress).await?,
                OperationKind::Download => self.download(ctx, &mut progress).await?,
                OperationKind::InstallOnline => self.install_online(ctx, &mut progress).await?,
                OperationKind::InstallOffline => self.install_offline(ctx, &mut progress).await?,
                OperationKind::UpdateOffice => self.update_office(ctx, &mut progress).await?,
                OperationKind::UpdateDotnet => self.update_dotnet(ctx, &mut progress).await?,
                OperationKind::UpdateVcRedist => self.update_vcredist(ctx, &mut progress).await?,
            },
        };

        let line = outcome.summary_line();
        ctx.events.log(line.clone());
        ctx.events.status(line);
        if kind != OperationKind::ModuleCheck {
            progress.finish().await;
        }
        Ok(outcome)
    }

    /// Look for the update module and cache the answer.
    pub async fn check_module(
        &self,
        ctx: &OperationContext,
    ) -> Result<OperationOutcome, OperationError> {
        let output = self
            .process
            .execute(
                &CommandSpec::powershell(MODULE_CHECK_SCRIPT),
                ctx.settings.timeouts.module_check(),
                true,
            )
            .await?;

        if output.stdout.contains(UPDATE_MODULE) {
            ctx.coordinator
                .set_module_availability(ModuleAvailability::Available);
            Ok(OperationOutcome::completed(format!(
                "{UPDATE_MODULE} module is available."
            )))
        } else {
            ctx.coordinator
                .set_module_availability(ModuleAvailability::Unavailable);
            Ok(OperationOutcome::completed(format!(
                "{UPDATE_MODULE} module not found; it will be installed when first needed."
            )))
        }
    }

    /// Make sure the update module is present, installing it once if needed.
    ///
    /// A cached `Available` skips all work. Otherwise exactly one install
    /// attempt is made per call.
    pub async fn ensure_module(&self, ctx: &OperationContext) -> Result<(), OperationError> {
        if ctx.coordinator.module_availability().is_available() {
            return Ok(());
        }

        ctx.coordinator
            .set_module_availability(ModuleAvailability::Installing);
        ctx.events
            .log(format!("[INFO] Installing {UPDATE_MODULE} module..."));

        let result = self
            .process
            .execute(
                &CommandSpec::powershell(MODULE_INSTALL_SCRIPT),
                ctx.settings.timeouts.module_install(),
                true,
            )
            .await;

        let detail = match result {
            Ok(output) if output.stdout.contains("SUCCESS") => {
                ctx.coordinator
                    .set_module_availability(ModuleAvailability::Available);
                ctx.events
                    .log(format!("[OK] {UPDATE_MODULE} installed successfully."));
                return Ok(());
            }
            Ok(output) if output.diagnostic().is_empty() => {
                format!("installer exited with code {}", output.exit_code)
            }
            Ok(output) => output.diagnostic().to_string(),
            Err(e) => e.to_string(),
        };

        ctx.coordinator
            .set_module_availability(ModuleAvailability::Unavailable);
        Err(OperationError::DependencyInstallFailed {
            module: UPDATE_MODULE.to_string(),
            detail,
        })
    }

    /// List available updates.
    pub async fn scan(
        &self,
        ctx: &OperationContext,
        progress: &mut ProgressSynth,
    ) -> Result<OperationOutcome, OperationError> {
        ctx.events.log("[CHECK] Searching online for updates...");
        progress.setup_to(10).await;
        self.ensure_module(ctx).await?;
        progress.complete_setup().await;

        let output = progress
            .track(self.process.execute(
                &CommandSpec::powershell(SCAN_SCRIPT),
                ctx.settings.timeouts.scan(),
                true,
            ))
            .await?;

        check_error_stream(&output)?;
        if reports_no_updates(&output) {
            return Ok(OperationOutcome::up_to_date("System"));
        }
        if !output.success() {
            return Err(OperationError::non_zero_exit(
                output.exit_code,
                output.diagnostic(),
            ));
        }

        let lines: Vec<&str> = output.lines().collect();
        ctx.events.log("[FOUND] Available updates:");
        for line in lines.iter().take(SCAN_PREVIEW_LINES) {
            ctx.events.log(*line);
        }
        if lines.len() > SCAN_PREVIEW_LINES {
            ctx.events.log(format!(
                "... and {} more lines",
                lines.len() - SCAN_PREVIEW_LINES
            ));
        }

        let kbs: BTreeSet<&str> = self
            .kb_pattern
            .find_iter(&output.stdout)
            .map(|m| m.as_str())
            .collect();
        Ok(if kbs.is_empty() {
            OperationOutcome::completed("Scan complete; see the list above.")
        } else {
            OperationOutcome::completed(format!("{} update(s) available.", kbs.len()))
        })
    }

    /// Download available updates into the repository and write the manifest.
    pub async fn download(
        &self,
        ctx: &OperationContext,
        progress: &mut ProgressSynth,
    ) -> Result<OperationOutcome, OperationError> {
        let download_dir = ctx.settings.download_dir();
        ctx.events.log(format!(
            "[DOWNLOAD] Downloading updates to {}...",
            ctx.settings.repo_path
        ));
        progress.setup_to(10).await;
        self.ensure_module(ctx).await?;
        fs::create_dir_all(&download_dir)?;
        progress.complete_setup().await;

        let script = DOWNLOAD_SCRIPT.replace("__DOWNLOAD_DIR__", &ps_quote(download_dir.as_str()));
        let output = progress
            .track(self.process.execute(
                &CommandSpec::powershell(&script),
                ctx.settings.timeouts.download(),
                true,
            ))
            .await?;

        for line in output.lines() {
            ctx.events.log(line);
        }
        check_error_stream(&output)?;
        if reports_no_updates(&output) || output.stdout.contains("No updates to download") {
            return Ok(OperationOutcome::up_to_date("System"));
        }
        if !output.success() {
            return Err(OperationError::non_zero_exit(
                output.exit_code,
                output.diagnostic(),
            ));
        }

        let manifest = UpdateManifest::from_directory(&download_dir)
            .and_then(|m| m.write(&ctx.settings.manifest_path()).map(|_| m));
        let count = match manifest {
            Ok(manifest) => {
                ctx.events.log(format!(
                    "[INFO] Created update manifest with {} files.",
                    manifest.count
                ));
                manifest.count
            }
            Err(e) => {
                tracing::warn!("Manifest not written: {:#}", e);
                ctx.events
                    .log(format!("[WARNING] Could not create update manifest: {e}"));
                0
            }
        };

        Ok(OperationOutcome::completed(format!(
            "Updates downloaded to repository ({count} files)."
        )))
    }

    /// Install pending updates straight from Windows Update.
    pub async fn install_online(
        &self,
        ctx: &OperationContext,
        progress: &mut ProgressSynth,
    ) -> Result<OperationOutcome, OperationError> {
        ctx.events.log("[INSTALL] Installing updates online...");
        progress.setup_to(10).await;
        self.ensure_module(ctx).await?;
        progress.complete_setup().await;

        let listing = progress
            .track(self.process.execute(
                &CommandSpec::powershell(PENDING_LIST_SCRIPT),
                ctx.settings.timeouts.scan(),
                true,
            ))
            .await?;

        check_error_stream(&listing)?;
        if reports_no_updates(&listing) {
            return Ok(OperationOutcome::up_to_date("System"));
        }
        if !listing.success() {
            return Err(OperationError::non_zero_exit(
                listing.exit_code,
                listing.diagnostic(),
            ));
        }

        let updates = parse_pending_updates(&listing.stdout)?;
        if updates.is_empty() {
            return Ok(OperationOutcome::up_to_date("System"));
        }

        ctx.events.log(format!(
            "[INFO] Found {} updates to install. This may take some time...",
            updates.len()
        ));
        for update in &updates {
            ctx.events.log(format!("  - {}", update.describe()));
        }

        let reboot = ctx.settings.auto_reboot;
        let script = INSTALL_ONLINE_SCRIPT.replace("__REBOOT__", if reboot { "-AutoReboot" } else { "" });
        ctx.events
            .log("[INFO] Installing updates... (This may take a while)");
        let output = progress
            .track(self.process.execute(
                &CommandSpec::powershell(&script),
                ctx.settings.timeouts.install_online(),
                false,
            ))
            .await?;

        if !output.success() {
            return Err(OperationError::non_zero_exit(
                output.exit_code,
                "some updates may have failed to install",
            ));
        }
        if reboot {
            ctx.events
                .log("[INFO] System will reboot automatically if required.");
        }
        Ok(OperationOutcome::completed(format!(
            "{} online update(s) installed.",
            updates.len()
        )))
    }

    /// Apply every package in the repository, one at a time.
    ///
    /// A stop request is honored between packages. Per-package failures are
    /// counted, not fatal.
    pub async fn install_offline(
        &self,
        ctx: &OperationContext,
        progress: &mut ProgressSynth,
    ) -> Result<OperationOutcome, OperationError> {
        let download_dir = ctx.settings.download_dir();
        ctx.events.log(format!(
            "[OFFLINE] Installing updates from {}...",
            ctx.settings.repo_path
        ));
        progress.setup_to(10).await;

        if !download_dir.is_dir() {
            return Err(OperationError::ResourceNotFound(
                "Download directory does not exist. Please download updates first.".to_string(),
            ));
        }
        let packages = package_files(&download_dir, INSTALLABLE_EXTENSIONS)
            .map_err(|e| OperationError::ResourceNotFound(format!("{e:#}")))?;
        if packages.is_empty() {
            return Err(OperationError::ResourceNotFound(
                "No update files found in repository. Please download updates first."
                    .to_string(),
            ));
        }

        let total = packages.len();
        ctx.events
            .log(format!("[INFO] Found {total} update files to install."));
        progress.complete_setup().await;

        let mut summary = BatchSummary::new("Installed", total);
        for (index, package) in packages.iter().enumerate() {
            if ctx.stop_requested() {
                ctx.events.log(format!(
                    "[STOP] Stop requested; skipping the remaining {} package(s).",
                    total - index
                ));
                summary.stopped_early = true;
                break;
            }

            let name = package.file_name().unwrap_or(package.as_str());
            ctx.events
                .log(format!("[{}/{}] Installing {}...", index + 1, total, name));

            let is_cab = package
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("cab"));
            let spec = if is_cab {
                CommandSpec::new("dism.exe").args([
                    "/online".to_string(),
                    "/add-package".to_string(),
                    format!("/packagepath:{package}"),
                    "/quiet".to_string(),
                    "/norestart".to_string(),
                ])
            } else {
                CommandSpec::new("wusa.exe").args([package.as_str(), "/quiet", "/norestart"])
            };

            match self
                .process
                .execute(&spec, ctx.settings.timeouts.install_item(), true)
                .await
            {
                Ok(output) if output.success() => {
                    ctx.events.log("  [OK] Successfully installed");
                    summary.succeeded += 1;
                }
                Ok(output) if output.exit_code == ALREADY_INSTALLED_EXIT => {
                    ctx.events.log("  [SKIP] Already installed");
                    summary.skipped += 1;
                }
                Ok(output) => {
                    ctx.events
                        .log(format!("  [ERROR] Failed with code {}", output.exit_code));
                    summary.failed += 1;
                }
                Err(ProcessError::Timeout(limit)) => {
                    ctx.events.log(format!(
                        "  [ERROR] Installation timed out after {} seconds",
                        limit.as_secs()
                    ));
                    summary.failed += 1;
                }
                Err(e) => {
                    ctx.events.log(format!("  [ERROR] {e}"));
                    summary.failed += 1;
                }
            }
            progress.batch_progress(index + 1, total);
        }

        if summary.succeeded > 0 {
            if ctx.settings.auto_reboot {
                summary.reboot_scheduled = self.schedule_reboot(ctx).await;
            } else {
                ctx.events
                    .log("[INFO] Please reboot to complete installation.");
            }
        }

        Ok(OperationOutcome::Batch(summary))
    }

    async fn schedule_reboot(&self, ctx: &OperationContext) -> bool {
        ctx.events.log(format!(
            "[INFO] System will reboot in {REBOOT_DELAY_SECS} seconds to complete installation."
        ));
        let spec = CommandSpec::new("shutdown").args([
            "/r".to_string(),
            "/t".to_string(),
            REBOOT_DELAY_SECS.to_string(),
            "/c".to_string(),
            "Rebooting to complete update installation".to_string(),
        ]);
        match self.process.execute(&spec, REBOOT_TIMEOUT, true).await {
            Ok(output) if output.success() => true,
            Ok(output) => {
                ctx.events.log(format!(
                    "[WARNING] Could not schedule reboot (code {}).",
                    output.exit_code
                ));
                false
            }
            Err(e) => {
                ctx.events
                    .log(format!("[WARNING] Could not schedule reboot: {e}"));
                false
            }
        }
    }

    /// Update Office through its Click-to-Run client.
    pub async fn update_office(
        &self,
        ctx: &OperationContext,
        progress: &mut ProgressSynth,
    ) -> Result<OperationOutcome, OperationError> {
        ctx.events.log("[OFFICE] Checking for Office Click-to-Run...");
        progress.setup_to(10).await;

        let client = self
            .office_client_paths
            .iter()
            .find(|path| path.is_file())
            .ok_or_else(|| {
                OperationError::DependencyMissing(
                    "Office Click-to-Run client (is Office installed?)".to_string(),
                )
            })?;
        ctx.events.log(format!("[INFO] Found Office at: {client}"));
        progress.complete_setup().await;

        ctx.events.log("[INFO] Starting Office update process...");
        let timeout = ctx.settings.timeouts.office();
        let quiet = CommandSpec::new(client.as_str()).args(["/update", "user", "/displaylevel", "false"]);
        let output = progress
            .track(self.process.execute(&quiet, timeout, true))
            .await?;
        if output.success() {
            return Ok(OperationOutcome::completed("Office updated successfully."));
        }

        ctx.events.log("[INFO] Trying alternative update method...");
        let interactive = CommandSpec::new(client.as_str()).args(["/update", "user"]);
        let output = progress
            .track(self.process.execute(&interactive, timeout, true))
            .await?;
        if output.success() {
            Ok(OperationOutcome::completed("Office updated successfully."))
        } else {
            Err(OperationError::non_zero_exit(
                output.exit_code,
                output.diagnostic(),
            ))
        }
    }

    /// Install pending .NET Framework updates.
    pub async fn update_dotnet(
        &self,
        ctx: &OperationContext,
        progress: &mut ProgressSynth,
    ) -> Result<OperationOutcome, OperationError> {
        ctx.events.log("[.NET] Checking for .NET Framework updates...");
        progress.setup_to(10).await;
        self.ensure_module(ctx).await?;
        progress.complete_setup().await;

        let output = progress
            .track(self.process.execute(
                &CommandSpec::powershell(DOTNET_SCRIPT),
                ctx.settings.timeouts.dotnet(),
                true,
            ))
            .await?;

        check_error_stream(&output)?;
        if reports_no_updates(&output) || output.stdout.contains("No .NET updates available") {
            return Ok(OperationOutcome::up_to_date(".NET Framework"));
        }
        for line in output.lines() {
            ctx.events.log(line);
        }
        if !output.success() {
            return Err(OperationError::non_zero_exit(
                output.exit_code,
                output.diagnostic(),
            ));
        }
        Ok(OperationOutcome::completed(".NET updates installed successfully."))
    }

    /// Refresh the Visual C++ redistributables, through winget when present.
    pub async fn update_vcredist(
        &self,
        ctx: &OperationContext,
        progress: &mut ProgressSynth,
    ) -> Result<OperationOutcome, OperationError> {
        ctx.events
            .log("[VC++] Updating Visual C++ Redistributables...");
        progress.setup_to(10).await;
        let winget = self.winget_available().await;
        progress.complete_setup().await;

        if winget {
            self.vcredist_via_winget(ctx, progress).await
        } else {
            self.vcredist_via_download(ctx, progress).await
        }
    }

    async fn winget_available(&self) -> bool {
        let lookup = CommandSpec::new("where").arg("winget");
        matches!(
            self.process.execute(&lookup, WINGET_LOOKUP_TIMEOUT, true).await,
            Ok(output) if output.success()
        )
    }

    async fn vcredist_via_winget(
        &self,
        ctx: &OperationContext,
        progress: &mut ProgressSynth,
    ) -> Result<OperationOutcome, OperationError> {
        ctx.events
            .log("[INFO] Using winget to update VC++ Redistributables...");

        let list = CommandSpec::new("winget").args(["list", "--id", "Microsoft.VCRedist"]);
        if let Ok(installed) = self.process.execute(&list, WINGET_LIST_TIMEOUT, true).await {
            let entries: Vec<&str> = installed
                .lines()
                .filter(|line| line.contains("Microsoft.VCRedist"))
                .collect();
            if !entries.is_empty() {
                ctx.events.log("[INFO] Installed VC++ Redistributables:");
                for entry in entries {
                    ctx.events.log(format!("  - {}", entry.trim()));
                }
            }
        }

        let upgrade = CommandSpec::new("winget").args([
            "upgrade",
            "--id",
            "Microsoft.VCRedist",
            "--all",
            "--silent",
            "--accept-package-agreements",
            "--accept-source-agreements",
        ]);
        let output = progress
            .track(self.process.execute(&upgrade, ctx.settings.timeouts.vcredist(), true))
            .await?;

        match output.exit_code {
            0 => Ok(OperationOutcome::completed(
                "VC++ Redistributables updated via winget.",
            )),
            WINGET_NO_UPGRADE_EXIT => Ok(OperationOutcome::up_to_date("VC++ Redistributables")),
            code => Err(OperationError::non_zero_exit(code, output.diagnostic())),
        }
    }

    async fn vcredist_via_download(
        &self,
        ctx: &OperationContext,
        progress: &mut ProgressSynth,
    ) -> Result<OperationOutcome, OperationError> {
        ctx.events
            .log("[INFO] Winget not found. Downloading latest VC++ Redistributables...");

        let targets: Vec<(&str, &str)> = VCREDIST_SOURCES
            .iter()
            .copied()
            .filter(|(arch, _)| *arch != "ARM64" || self.arm64_host)
            .collect();

        let mut summary = BatchSummary::new("VC++ Redistributables", targets.len());
        for (index, (arch, url)) in targets.iter().enumerate() {
            if ctx.stop_requested() {
                summary.stopped_early = true;
                break;
            }
            ctx.events.log(format!("[INFO] Downloading VC++ {arch}..."));
            let script = VCREDIST_SCRIPT
                .replace("__URL__", url)
                .replace("__ARCH__", arch);
            match self
                .process
                .execute(
                    &CommandSpec::powershell(&script),
                    ctx.settings.timeouts.vcredist(),
                    true,
                )
                .await
            {
                Ok(output) if output.success() => {
                    ctx.events
                        .log(format!("  [OK] {arch} redistributable updated"));
                    summary.succeeded += 1;
                }
                Ok(output) => {
                    ctx.events.log(format!(
                        "  [ERROR] Failed to update {arch}: {}",
                        output.diagnostic()
                    ));
                    summary.failed += 1;
                }
                Err(e) => {
                    ctx.events
                        .log(format!("  [ERROR] Failed to update {arch}: {e}"));
                    summary.failed += 1;
                }
            }
            progress.batch_progress(index + 1, targets.len());
        }

        Ok(OperationOutcome::Batch(summary))
    }
}

/// Error-stream text other than the no-updates code is a failure, even with
/// exit code 0. The Windows Update scripts print their "nothing found" text
/// after a non-terminating cmdlet error too, so stdout alone cannot be trusted.
fn check_error_stream(output: &ProcessOutput) -> Result<(), OperationError> {
    let stderr = output.stderr.trim();
    if stderr.is_empty() || stderr.contains(NO_UPDATES_CODE) {
        return Ok(());
    }
    if output.success() {
        Err(OperationError::MalformedResult(format!(
            "error output from a successful run: {stderr}"
        )))
    } else {
        Err(OperationError::non_zero_exit(output.exit_code, stderr))
    }
}

/// Both "no updates" signals mean the same thing: an empty successful
/// result, or the Windows Update no-updates code in any stream.
fn reports_no_updates(output: &ProcessOutput) -> bool {
    output.mentions(NO_UPDATES_CODE)
        || output.stdout.contains("No updates available")
        || (output.success() && output.stdout.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_updates_detection() {
        assert!(reports_no_updates(&ProcessOutput::new("", "", 0)));
        assert!(reports_no_updates(&ProcessOutput::new(
            "",
            "Exception 0x80240024",
            1
        )));
        assert!(reports_no_updates(&ProcessOutput::new("No updates available", "", 0)));
        assert!(!reports_no_updates(&ProcessOutput::new("", "boom", 1)));
        assert!(!reports_no_updates(&ProcessOutput::new("KB5031356 Update", "", 0)));
    }

    #[test]
    fn test_error_stream_overrides_empty_output() {
        let failed = check_error_stream(&ProcessOutput::new("", "Get-WUList : 0x8024401C", 0));
        assert!(matches!(failed, Err(OperationError::MalformedResult(_))));

        let failed = check_error_stream(&ProcessOutput::new("", "Access denied", 5));
        assert!(matches!(failed, Err(OperationError::NonZeroExit { code: 5, .. })));

        assert!(check_error_stream(&ProcessOutput::new("", "HRESULT 0x80240024", 1)).is_ok());
        assert!(check_error_stream(&ProcessOutput::new("KB5031356", "  \n", 0)).is_ok());
    }

    #[test]
    fn test_winget_no_upgrade_code() {
        assert_eq!(WINGET_NO_UPGRADE_EXIT, -1_978_335_189);
    }

    #[test]
    fn test_ps_quote_doubles_single_quotes() {
        assert_eq!(ps_quote(r"C:\Bob's Repo"), r"C:\Bob''s Repo");
    }

    #[test]
    fn test_every_kind_has_a_distinct_label() {
        let kinds = [
            OperationKind::ModuleCheck,
            OperationKind::Scan,
            OperationKind::Download,
            OperationKind::InstallOnline,
            OperationKind::InstallOffline,
            OperationKind::UpdateOffice,
            OperationKind::UpdateDotnet,
            OperationKind::UpdateVcRedist,
        ];
        let labels: BTreeSet<&str> = kinds.iter().map(|k| k.label()).collect();
        assert_eq!(labels.len(), kinds.len());
        assert_eq!(OperationKind::ModuleCheck.category(), None);
        assert_eq!(OperationKind::UpdateOffice.category(), Some("office"));
    }

    #[test]
    fn test_scripts_are_templated() {
        let script = DOWNLOAD_SCRIPT.replace("__DOWNLOAD_DIR__", &ps_quote("D:\\repo\\Downloads"));
        assert!(script.contains("$downloadPath = 'D:\\repo\\Downloads'"));
        assert!(INSTALL_ONLINE_SCRIPT
            .replace("__REBOOT__", "-AutoReboot")
            .contains("-AcceptAll -AutoReboot"));
    }
}
