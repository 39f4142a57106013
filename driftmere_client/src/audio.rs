// Client-side sound state: loading, playback instances, volume ramps.
//
// The server drives audio entirely through frame commands (LOAD_SOUND,
// PLAY_SOUND, STOP_SOUND, SET_VOLUME); the client keeps the actual state.
// Decoding/fetching is abstracted behind `SoundLoader` so the bank is
// testable without an audio backend — the real loader is platform glue.
//
// Rules the server relies on:
// - `load` is idempotent by name; repeated LOAD_SOUNDs are free.
// - PLAY_SOUND on a sound that has not finished loading is a silent no-op.
//   The server works around this by playing once the decode window has
//   passed and steering loudness with SET_VOLUME afterwards.
// - Re-playing a looped sound replaces the prior instance rather than
//   stacking a second copy.
// - STOP_SOUND fades to silence before removing the source, so surf does
//   not click off at the fog boundary.
// - SET_VOLUME ramps toward the target rather than jumping.

use std::collections::BTreeMap;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;

use driftmere_protocol::DrawCommand;

/// Volume change per second while ramping toward a target.
const VOLUME_RAMP_PER_SEC: f32 = 2.0;
/// Volume change per second while fading out a stopped source.
const FADE_OUT_PER_SEC: f32 = 4.0;

/// A decoded audio asset. The client never inspects samples; duration is
/// what playback bookkeeping needs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecodedSound {
    pub duration: f32,
}

/// Asynchronous fetch+decode. `request` starts a load; completed loads are
/// collected with `poll`.
pub trait SoundLoader {
    fn request(&mut self, name: &str, url: &str);
    fn poll(&mut self) -> Vec<(String, Result<DecodedSound, String>)>;
}

/// Loader that runs fetch+decode on a worker thread and posts results back
/// through a channel. The decode function itself is platform glue supplied
/// by the backend (it gets the url, returns the decoded asset).
pub struct ThreadedLoader {
    jobs: Sender<(String, String)>,
    results: Receiver<(String, Result<DecodedSound, String>)>,
}

impl ThreadedLoader {
    pub fn new<F>(decode: F) -> Self
    where
        F: Fn(&str) -> Result<DecodedSound, String> + Send + 'static,
    {
        let (job_tx, job_rx) = channel::<(String, String)>();
        let (result_tx, result_rx) = channel();
        thread::spawn(move || {
            while let Ok((name, url)) = job_rx.recv() {
                if result_tx.send((name, decode(&url))).is_err() {
                    return;
                }
            }
        });
        Self {
            jobs: job_tx,
            results: result_rx,
        }
    }
}

impl SoundLoader for ThreadedLoader {
    fn request(&mut self, name: &str, url: &str) {
        let _ = self.jobs.send((name.to_string(), url.to_string()));
    }

    fn poll(&mut self) -> Vec<(String, Result<DecodedSound, String>)> {
        self.results.try_iter().collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
enum SoundHandle {
    Loading,
    Ready(DecodedSound),
    Failed,
}

/// One playing instance of a sound.
#[derive(Debug)]
struct Source {
    volume: f32,
    target_volume: f32,
    fading_out: bool,
    looped: bool,
    position: f32,
    duration: f32,
}

/// All audio state for one client.
#[derive(Default)]
pub struct SoundBank {
    sounds: BTreeMap<String, SoundHandle>,
    sources: BTreeMap<String, Source>,
}

impl SoundBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one frame command. Non-audio commands are ignored so the
    /// renderer can hand the whole decoded frame over.
    pub fn apply(&mut self, cmd: &DrawCommand, loader: &mut dyn SoundLoader) {
        match cmd {
            DrawCommand::LoadSound { name, url } => self.load(name, url, loader),
            DrawCommand::PlaySound {
                name,
                looped,
                volume,
            } => self.play(name, *looped, *volume),
            DrawCommand::StopSound { name } => self.stop(name),
            DrawCommand::SetVolume { name, volume } => self.set_volume(name, *volume),
            _ => {}
        }
    }

    /// Start loading a sound. Already-known names (loading, ready, or
    /// failed) are left alone.
    pub fn load(&mut self, name: &str, url: &str, loader: &mut dyn SoundLoader) {
        if self.sounds.contains_key(name) {
            return;
        }
        self.sounds.insert(name.to_string(), SoundHandle::Loading);
        loader.request(name, url);
    }

    /// Start playback. A sound that is not ready yet is silently skipped;
    /// the server re-steers volume every frame, so nothing is lost.
    pub fn play(&mut self, name: &str, looped: bool, volume: f32) {
        let duration = match self.sounds.get(name) {
            Some(SoundHandle::Ready(decoded)) => decoded.duration,
            _ => return,
        };
        self.sources.insert(
            name.to_string(),
            Source {
                volume,
                target_volume: volume,
                fading_out: false,
                looped,
                position: 0.0,
                duration,
            },
        );
    }

    /// Fade the named source to silence, then remove it. Unknown names are
    /// a no-op.
    pub fn stop(&mut self, name: &str) {
        if let Some(source) = self.sources.get_mut(name) {
            source.fading_out = true;
            source.target_volume = 0.0;
        }
    }

    /// Ramp a playing source toward a new volume. Inactive names are a
    /// no-op.
    pub fn set_volume(&mut self, name: &str, volume: f32) {
        if let Some(source) = self.sources.get_mut(name) {
            if !source.fading_out {
                source.target_volume = volume.clamp(0.0, 1.0);
            }
        }
    }

    /// Advance time: collect finished loads, ramp volumes, advance playback
    /// positions, and drop sources that ended or faded out.
    pub fn tick(&mut self, dt: f32, loader: &mut dyn SoundLoader) {
        for (name, result) in loader.poll() {
            let handle = match result {
                Ok(decoded) => SoundHandle::Ready(decoded),
                Err(e) => {
                    log::warn!("sound {name} failed to load: {e}");
                    SoundHandle::Failed
                }
            };
            self.sounds.insert(name, handle);
        }

        let mut finished = Vec::new();
        for (name, source) in &mut self.sources {
            let rate = if source.fading_out {
                FADE_OUT_PER_SEC
            } else {
                VOLUME_RAMP_PER_SEC
            };
            let step = rate * dt;
            if source.volume < source.target_volume {
                source.volume = (source.volume + step).min(source.target_volume);
            } else {
                source.volume = (source.volume - step).max(source.target_volume);
            }
            if source.fading_out && source.volume <= 0.0 {
                finished.push(name.clone());
                continue;
            }

            source.position += dt;
            if source.position >= source.duration {
                if source.looped {
                    source.position %= source.duration.max(f32::EPSILON);
                } else {
                    finished.push(name.clone());
                }
            }
        }
        for name in finished {
            self.sources.remove(&name);
        }
    }

    pub fn is_playing(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Current (post-ramp) volume of a source, if playing.
    pub fn volume(&self, name: &str) -> Option<f32> {
        self.sources.get(name).map(|s| s.volume)
    }

    pub fn is_ready(&self, name: &str) -> bool {
        matches!(self.sounds.get(name), Some(SoundHandle::Ready(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Loader where tests script completions by hand.
    #[derive(Default)]
    struct FakeLoader {
        requests: Vec<(String, String)>,
        completions: Vec<(String, Result<DecodedSound, String>)>,
    }

    impl FakeLoader {
        fn complete(&mut self, name: &str, duration: f32) {
            self.completions
                .push((name.to_string(), Ok(DecodedSound { duration })));
        }
    }

    impl SoundLoader for FakeLoader {
        fn request(&mut self, name: &str, url: &str) {
            self.requests.push((name.to_string(), url.to_string()));
        }

        fn poll(&mut self) -> Vec<(String, Result<DecodedSound, String>)> {
            std::mem::take(&mut self.completions)
        }
    }

    #[test]
    fn load_is_idempotent_by_name() {
        let mut bank = SoundBank::new();
        let mut loader = FakeLoader::default();
        bank.load("surf", "assets/surf.ogg", &mut loader);
        bank.load("surf", "assets/surf.ogg", &mut loader);
        bank.load("surf", "other/url.ogg", &mut loader);
        assert_eq!(loader.requests.len(), 1);
    }

    #[test]
    fn play_before_ready_is_a_silent_no_op() {
        let mut bank = SoundBank::new();
        let mut loader = FakeLoader::default();
        bank.load("surf", "assets/surf.ogg", &mut loader);
        bank.play("surf", true, 0.5);
        assert!(!bank.is_playing("surf"));

        loader.complete("surf", 10.0);
        bank.tick(0.05, &mut loader);
        assert!(bank.is_ready("surf"));
        bank.play("surf", true, 0.5);
        assert!(bank.is_playing("surf"));
    }

    #[test]
    fn looped_replay_replaces_the_instance() {
        let mut bank = SoundBank::new();
        let mut loader = FakeLoader::default();
        bank.load("surf", "assets/surf.ogg", &mut loader);
        loader.complete("surf", 10.0);
        bank.tick(0.05, &mut loader);

        bank.play("surf", true, 0.5);
        for _ in 0..40 {
            bank.tick(0.05, &mut loader); // 2s in
        }
        bank.play("surf", true, 0.5);
        assert!(bank.is_playing("surf"));
        // Position restarted: 9s more of a 10s sound does not end it, which
        // it would if the old 2s position had survived.
        for _ in 0..180 {
            bank.tick(0.05, &mut loader);
        }
        assert!(bank.is_playing("surf"));
    }

    #[test]
    fn non_looped_sound_ends_on_its_own() {
        let mut bank = SoundBank::new();
        let mut loader = FakeLoader::default();
        bank.load("chime", "assets/chime.ogg", &mut loader);
        loader.complete("chime", 0.2);
        bank.tick(0.05, &mut loader);
        bank.play("chime", false, 1.0);
        for _ in 0..6 {
            bank.tick(0.05, &mut loader);
        }
        assert!(!bank.is_playing("chime"));
    }

    #[test]
    fn stop_fades_out_then_removes() {
        let mut bank = SoundBank::new();
        let mut loader = FakeLoader::default();
        bank.load("surf", "assets/surf.ogg", &mut loader);
        loader.complete("surf", 100.0);
        bank.tick(0.05, &mut loader);
        bank.play("surf", true, 1.0);

        bank.stop("surf");
        bank.tick(0.05, &mut loader);
        // Still audible but quieter.
        let v = bank.volume("surf").unwrap();
        assert!(v > 0.0 && v < 1.0);
        for _ in 0..20 {
            bank.tick(0.05, &mut loader);
        }
        assert!(!bank.is_playing("surf"));
    }

    #[test]
    fn set_volume_ramps_rather_than_jumping() {
        let mut bank = SoundBank::new();
        let mut loader = FakeLoader::default();
        bank.load("surf", "assets/surf.ogg", &mut loader);
        loader.complete("surf", 100.0);
        bank.tick(0.05, &mut loader);
        bank.play("surf", true, 0.0);

        bank.set_volume("surf", 1.0);
        bank.tick(0.05, &mut loader);
        let after_one = bank.volume("surf").unwrap();
        assert!(after_one > 0.0 && after_one < 1.0);
        for _ in 0..20 {
            bank.tick(0.05, &mut loader);
        }
        assert_eq!(bank.volume("surf"), Some(1.0));
    }

    #[test]
    fn set_volume_on_inactive_source_is_a_no_op() {
        let mut bank = SoundBank::new();
        bank.set_volume("surf", 0.5);
        assert!(!bank.is_playing("surf"));
    }

    #[test]
    fn threaded_loader_posts_results_back() {
        let mut loader = ThreadedLoader::new(|url: &str| {
            if url.ends_with(".ogg") {
                Ok(DecodedSound { duration: 3.0 })
            } else {
                Err(format!("unsupported: {url}"))
            }
        });
        loader.request("surf", "assets/surf.ogg");
        loader.request("bad", "assets/bad.wav");

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        let mut results = Vec::new();
        while results.len() < 2 && std::time::Instant::now() < deadline {
            results.extend(loader.poll());
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            results,
            vec![
                ("bad".to_string(), Err("unsupported: assets/bad.wav".to_string())),
                ("surf".to_string(), Ok(DecodedSound { duration: 3.0 })),
            ]
        );
    }

    #[test]
    fn failed_load_never_plays() {
        let mut bank = SoundBank::new();
        let mut loader = FakeLoader::default();
        bank.load("surf", "assets/surf.ogg", &mut loader);
        loader
            .completions
            .push(("surf".into(), Err("404".into())));
        bank.tick(0.05, &mut loader);
        bank.play("surf", true, 1.0);
        assert!(!bank.is_playing("surf"));
    }
}
