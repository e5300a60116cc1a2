use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use provis_engine::ProgressEvent;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

fn download_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {bytes}/{total_bytes} @ {bytes_per_sec}")
        .unwrap()
        .progress_chars("=> ")
}

fn download_style_unsized() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg} {bytes} @ {bytes_per_sec}")
        .unwrap()
}

/// One progress bar per in-flight item, keyed by item id
#[derive(Clone)]
pub struct ProgressManager {
    multi: MultiProgress,
    bars: Arc<Mutex<HashMap<String, ProgressBar>>>,
    disabled: bool,
}

impl ProgressManager {
    pub fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            bars: Arc::new(Mutex::new(HashMap::new())),
            disabled: false,
        }
    }

    pub fn new_disabled(multi: MultiProgress) -> Self {
        Self {
            multi,
            bars: Arc::new(Mutex::new(HashMap::new())),
            disabled: true,
        }
    }

    pub fn handle_event(&self, event: ProgressEvent) {
        if self.disabled {
            return;
        }

        let mut bars = self.bars.lock().unwrap();
        match event {
            ProgressEvent::Started {
                item_id,
                total_bytes,
            } => {
                let bar = match total_bytes {
                    Some(total) => {
                        let bar = self.multi.add(ProgressBar::new(total));
                        bar.set_style(download_style());
                        bar
                    }
                    None => {
                        let bar = self.multi.add(ProgressBar::new_spinner());
                        bar.set_style(download_style_unsized());
                        bar
                    }
                };
                bar.set_message(format!("Downloading {item_id}"));
                bar.enable_steady_tick(Duration::from_millis(500));
                bars.insert(item_id, bar);
            }
            ProgressEvent::Transferred { item_id, progress } => {
                if let Some(bar) = bars.get(&item_id) {
                    if let Some(total) = progress.total_bytes {
                        bar.set_length(total);
                    }
                    bar.set_position(progress.bytes_transferred);
                }
            }
            ProgressEvent::Completed { item_id } => {
                if let Some(bar) = bars.remove(&item_id) {
                    bar.finish_with_message(format!("Finished {item_id}"));
                }
            }
        }
    }

    #[inline]
    #[allow(unused)]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}
