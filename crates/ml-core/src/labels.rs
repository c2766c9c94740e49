use std::{borrow::Cow, fs, path::Path};

use anyhow::{Context, Result, bail};

/// Class table of the stock YOLOv8 COCO checkpoints.
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Human readable names indexed by detector class id.
#[derive(Clone, Debug)]
pub struct ClassNames {
    names: Vec<String>,
}

impl Default for ClassNames {
    fn default() -> Self {
        Self::coco()
    }
}

impl ClassNames {
    pub fn coco() -> Self {
        Self::new(COCO_CLASSES.iter().map(|name| name.to_string()).collect())
    }

    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Load one class name per line. Blank lines are skipped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read class names from {}", path.display()))?;
        let names: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            bail!("class names file {} is empty", path.display());
        }
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name for `class_id`, falling back to `class <id>` for unknown ids.
    pub fn name(&self, class_id: i64) -> Cow<'_, str> {
        usize::try_from(class_id)
            .ok()
            .and_then(|idx| self.names.get(idx))
            .map(|name| Cow::Borrowed(name.as_str()))
            .unwrap_or_else(|| Cow::Owned(format!("class {class_id}")))
    }
}
