//! Windows TTS backend using SAPI (System.Speech.Synthesis)
//!
//! Works on Windows and under WSL, where PowerShell is reachable through
//! interop. A persistent PowerShell process runs a small speech server
//! reading one command per line from stdin:
//! - s<text>: Cancel current speech, then speak text asynchronously
//! - a<text>: Queue text behind current speech
//! - x: Cancel current speech immediately
//! - p / c: Pause / continue
//! - r<rate>: Set rate (-10 to 10)
//! - v<volume>: Set volume (0-100)
//! - V<idx>: Set voice by index
//! - i: Reply `1` while speaking, else `0`
//! - L: Reply with the installed voices as one line of JSON
//! - g: Reply with the current voice name
//! - q: Quit
//!
//! Every reply is exactly one line on stdout.

use crate::backend::{
    Capabilities, NativeRange, PlaybackState, SpeechState, TextToSpeechBackend, Voice, VoiceList,
};
use crate::error::{BackendError, Result};
use crate::platform::find_executable;
use log::{debug, error, warn};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

pub const NAME: &str = "SAPI";

const RATE: NativeRange = NativeRange::new(-10.0, 0.0, 10.0);
const VOLUME: NativeRange = NativeRange::new(0.0, 50.0, 100.0);

const POWERSHELL_PATHS: &[&str] = &[
    "powershell.exe",
    "/mnt/c/Windows/System32/WindowsPowerShell/v1.0/powershell.exe",
];

const SERVER_SCRIPT: &str = r#"
$ErrorActionPreference = 'Stop'
Add-Type -AssemblyName System.Speech
$synth = New-Object System.Speech.Synthesis.SpeechSynthesizer
$synth.SetOutputToDefaultAudioDevice()
[Console]::Out.WriteLine('ready')
[Console]::Out.Flush()
$ErrorActionPreference = 'Continue'

function Reply($text) {
    [Console]::Out.WriteLine($text)
    [Console]::Out.Flush()
}

while ($null -ne ($line = [Console]::ReadLine())) {
    if ($line.Length -eq 0) { continue }

    $cmd = $line[0]
    $arg = $line.Substring(1)

    switch -CaseSensitive ($cmd) {
        's' {
            $synth.SpeakAsyncCancelAll()
            if ($synth.State -eq 'Paused') { $synth.Resume() }
            if ($arg) { [void]$synth.SpeakAsync($arg) }
        }
        'a' {
            if ($arg) { [void]$synth.SpeakAsync($arg) }
        }
        'x' {
            $synth.SpeakAsyncCancelAll()
            if ($synth.State -eq 'Paused') { $synth.Resume() }
        }
        'p' { $synth.Pause() }
        'c' { $synth.Resume() }
        'r' {
            if ($arg) { $synth.Rate = [Math]::Max(-10, [Math]::Min(10, [int]$arg)) }
        }
        'v' {
            if ($arg) { $synth.Volume = [Math]::Max(0, [Math]::Min(100, [int]$arg)) }
        }
        'V' {
            if ($arg) {
                $idx = [int]$arg
                $voices = $synth.GetInstalledVoices()
                if ($idx -ge 0 -and $idx -lt $voices.Count) {
                    $synth.SelectVoice($voices[$idx].VoiceInfo.Name)
                }
            }
        }
        'i' {
            if ($synth.State -eq 'Speaking') { Reply '1' } else { Reply '0' }
        }
        'L' {
            $list = @($synth.GetInstalledVoices() | ForEach-Object {
                @{ name = $_.VoiceInfo.Name; language = $_.VoiceInfo.Culture.Name }
            })
            Reply (ConvertTo-Json -Compress -InputObject $list)
        }
        'g' { Reply $synth.Voice.Name }
        'q' { break }
    }
}
"#;

/// One entry of the `L` reply
#[derive(Debug, Deserialize)]
struct SapiVoice {
    name: String,
    #[serde(default)]
    language: String,
}

/// Running PowerShell speech server
struct Server {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Server {
    fn start(powershell_path: &str) -> Result<Self> {
        debug!("Starting persistent PowerShell speech process");
        let mut child = Command::new(powershell_path)
            .arg("-NoProfile")
            .arg("-NonInteractive")
            .arg("-Command")
            .arg(SERVER_SCRIPT)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                error!("Failed to spawn PowerShell speech process: {}", e);
                BackendError::BackendNotAvailable
            })?;
        debug!("PowerShell speech process started with PID: {:?}", child.id());

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(BackendError::InternalBackendError);
        };
        let mut server = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        };

        // System.Speech failing to load ends the script before this line
        match server.read_reply() {
            Ok(line) if line == "ready" => Ok(server),
            _ => {
                debug!("Windows SAPI not available");
                server.shutdown();
                Err(BackendError::BackendNotAvailable)
            }
        }
    }

    fn send(&mut self, cmd: &str) -> Result<()> {
        writeln!(self.stdin, "{}", cmd).map_err(|e| {
            error!("Failed to write command to speech process: {}", e);
            BackendError::InternalBackendError
        })?;
        self.stdin.flush().map_err(|e| {
            error!("Failed to flush stdin: {}", e);
            BackendError::InternalBackendError
        })
    }

    fn read_reply(&mut self) -> Result<String> {
        let mut line = String::new();
        match self.stdout.read_line(&mut line) {
            Ok(0) => {
                error!("Speech process exited unexpectedly");
                Err(BackendError::InternalBackendError)
            }
            Ok(_) => Ok(line.trim_end_matches(['\r', '\n']).to_string()),
            Err(e) => {
                error!("Failed to read from speech process: {}", e);
                Err(BackendError::InternalBackendError)
            }
        }
    }

    fn query(&mut self, cmd: &str) -> Result<String> {
        self.send(cmd)?;
        self.read_reply()
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.send("q") {
            debug!("Failed to send quit command: {}", e);
        }
        match self.child.kill() {
            Ok(_) => {
                debug!("PowerShell speech process terminated");
                let _ = self.child.wait(); // Clean up zombie process
            }
            Err(e) => {
                debug!("Failed to kill PowerShell process: {}", e);
            }
        }
    }
}

/// Windows SAPI backend
///
/// Communicates with Windows TTS through a persistent PowerShell process.
pub struct SapiBackend {
    server: Option<Server>,

    state: SpeechState,

    /// SAPI rate, -10 to 10
    rate: f32,

    /// SAPI volume, 0 to 100
    volume: f32,

    voices: VoiceList,
}

impl SapiBackend {
    pub fn new() -> Self {
        Self {
            server: None,
            state: SpeechState::new(),
            rate: 0.0,
            volume: VOLUME.max,
            voices: VoiceList::new(),
        }
    }

    fn server(&mut self) -> Result<&mut Server> {
        self.server.as_mut().ok_or(BackendError::NotInitialized)
    }

    /// Escape text for the line protocol
    fn escape_text(text: &str) -> String {
        // A newline would end the command early
        text.replace(['\n', '\r'], " ")
    }

    fn parse_voices(json: &str) -> Result<Vec<Voice>> {
        let voices: Vec<SapiVoice> = serde_json::from_str(json).map_err(|e| {
            error!("Unexpected voice list from SAPI: {}", e);
            BackendError::InternalBackendError
        })?;
        Ok(voices.into_iter().map(|v| Voice::new(v.name, v.language)).collect())
    }
}

impl Default for SapiBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SapiBackend {
    fn drop(&mut self) {
        if let Some(mut server) = self.server.take() {
            debug!("Shutting down Windows SAPI backend");
            server.shutdown();
        }
    }
}

impl TextToSpeechBackend for SapiBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SPEAK
            | Capabilities::OUTPUT
            | Capabilities::STOP
            | Capabilities::PAUSE
            | Capabilities::IS_SPEAKING
            | Capabilities::VOLUME
            | Capabilities::RATE
            | Capabilities::VOICES
    }

    fn initialize(&mut self) -> Result<()> {
        self.state.check_initialize()?;
        debug!("Creating Windows SAPI backend");

        let powershell_path = find_executable(POWERSHELL_PATHS, &["-NoProfile", "-Command", "$PSVersionTable.PSVersion"])
            .ok_or_else(|| {
                debug!("PowerShell not found. WSL interop may not be enabled.");
                BackendError::BackendNotAvailable
            })?;
        debug!("Found PowerShell at: {}", powershell_path);

        self.server = Some(Server::start(&powershell_path)?);
        self.state.initialized()?;

        if let Err(e) = self.refresh_voices() {
            warn!("Could not list SAPI voices: {}", e);
        }
        Ok(())
    }

    fn speak(&mut self, text: &str, interrupt: bool) -> Result<()> {
        self.state.ensure_initialized()?;
        let escaped_text = Self::escape_text(text);
        debug!("Speaking: {}", escaped_text);
        let cmd = if interrupt { 's' } else { 'a' };
        self.server()?.send(&format!("{}{}", cmd, escaped_text))?;
        if interrupt {
            self.state.stop()?;
        }
        if self.state.get() != PlaybackState::Paused {
            self.state.speaking()?;
        }
        Ok(())
    }

    fn output(&mut self, text: &str, interrupt: bool) -> Result<()> {
        self.speak(text, interrupt)
    }

    fn is_speaking(&mut self) -> Result<bool> {
        self.state.ensure_initialized()?;
        let speaking = self.server()?.query("i")? == "1";
        if !speaking && self.state.get() != PlaybackState::Paused {
            self.state.finished();
        }
        Ok(speaking)
    }

    fn stop(&mut self) -> Result<()> {
        self.state.ensure_initialized()?;
        debug!("Canceling speech");
        self.server()?.send("x")?;
        self.state.stop()
    }

    fn pause(&mut self) -> Result<()> {
        self.state.ensure_initialized()?;
        if self.state.get() == PlaybackState::Speaking {
            self.is_speaking()?;
        }
        self.state.check_pause()?;
        self.server()?.send("p")?;
        self.state.pause()
    }

    fn resume(&mut self) -> Result<()> {
        self.state.check_resume()?;
        self.server()?.send("c")?;
        self.state.resume()
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.state.ensure_initialized()?;
        let native = VOLUME.to_native(volume)?.round();
        debug!("Setting volume to {}", native);
        self.server()?.send(&format!("v{}", native as i32))?;
        self.volume = native;
        Ok(())
    }

    fn volume(&mut self) -> Result<f32> {
        self.state.ensure_initialized()?;
        Ok(VOLUME.to_normalized(self.volume))
    }

    fn set_rate(&mut self, rate: f32) -> Result<()> {
        self.state.ensure_initialized()?;
        let native = RATE.to_native(rate)?.round();
        debug!("Setting rate to {}", native);
        self.server()?.send(&format!("r{}", native as i32))?;
        self.rate = native;
        Ok(())
    }

    fn rate(&mut self) -> Result<f32> {
        self.state.ensure_initialized()?;
        Ok(RATE.to_normalized(self.rate))
    }

    fn refresh_voices(&mut self) -> Result<()> {
        self.state.ensure_initialized()?;
        let server = self.server()?;
        let json = server.query("L")?;
        let current = server.query("g")?;
        let voices = Self::parse_voices(&json)?;
        debug!("Found {} SAPI voices", voices.len());
        self.voices.replace(voices);
        self.voices.select_by_name(&current);
        Ok(())
    }

    fn count_voices(&mut self) -> Result<usize> {
        self.state.ensure_initialized()?;
        Ok(self.voices.len())
    }

    fn voice_name(&mut self, index: usize) -> Result<String> {
        self.state.ensure_initialized()?;
        Ok(self.voices.get(index)?.name.clone())
    }

    fn voice_language(&mut self, index: usize) -> Result<String> {
        self.state.ensure_initialized()?;
        Ok(self.voices.get(index)?.language.clone())
    }

    fn set_voice(&mut self, index: usize) -> Result<()> {
        self.state.ensure_initialized()?;
        self.voices.get(index)?;
        debug!("Setting voice index to {}", index);
        self.server()?.send(&format!("V{}", index))?;
        self.voices.select(index)?;
        Ok(())
    }

    fn voice(&mut self) -> Result<usize> {
        self.state.ensure_initialized()?;
        self.voices.current()
    }
}
