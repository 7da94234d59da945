// 该文件是 Linghe （凌河） 项目的一部分。
// tests/tasks.rs - 任务端到端测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Linghe 开发者

mod common;

use std::{cell::RefCell, convert::Infallible, path::Path, rc::Rc};

use linghe::{
  input::{ImageSet, InputFrame},
  model::{DetectionSet, Labels},
  output::{ExportFormat, Exporter, Render},
  task::{BatchPredictTask, OneShotTask, RepeatShotTask, Task, Thresholds},
};
use serde_json::Value;

use common::{Traces, detector, image};

const THRESHOLDS: Thresholds = Thresholds {
  object: 0.25,
  nms: 0.45,
};

/// 记录每次输出的图像名与检测数
#[derive(Default, Clone)]
struct Collect {
  rendered: Rc<RefCell<Vec<(String, usize)>>>,
}

impl Render<InputFrame, DetectionSet> for Collect {
  type Error = Infallible;

  fn render_result(&self, frame: &InputFrame, result: &DetectionSet) -> Result<(), Self::Error> {
    self.rendered.borrow_mut().push((frame.name.clone(), result.len()));
    Ok(())
  }
}

fn frames(count: usize) -> std::vec::IntoIter<Result<InputFrame, std::io::Error>> {
  (0..count)
    .map(|id| {
      Ok(InputFrame {
        name: format!("frame-{}", id),
        id: id as u64,
        image: image(40, 30),
      })
    })
    .collect::<Vec<_>>()
    .into_iter()
}

/// 写入图像与 `.txt` 列表，第二行留空
fn image_folder(dir: &Path) -> ImageSet {
  image(40, 30).save(dir.join("a.png")).unwrap();
  image(64, 48).save(dir.join("b.png")).unwrap();
  let list = dir.join("val.txt");
  std::fs::write(&list, "a.png\n\nb.png\n").unwrap();
  ImageSet::discover(dir, Some(&list)).unwrap()
}

fn read_json(path: &Path) -> Value {
  serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn one_shot_renders_first_frame_and_frees_model() {
  let traces = Traces::default();
  let output = Collect::default();

  OneShotTask::new(THRESHOLDS)
    .run_task(frames(2), detector(&traces), output.clone())
    .unwrap();

  assert_eq!(*output.rendered.borrow(), vec![("frame-0".to_string(), 2)]);
  assert_eq!(traces.forwards(), 1);
  assert_eq!(traces.dropped.get(), 1);
}

#[test]
fn one_shot_without_input_fails() {
  let traces = Traces::default();
  let output = Collect::default();

  let result = OneShotTask::new(THRESHOLDS).run_task(frames(0), detector(&traces), output.clone());

  assert!(result.is_err());
  assert!(output.rendered.borrow().is_empty());
  assert_eq!(traces.forwards(), 0);
}

#[test]
fn repeat_shot_detects_the_requested_times() {
  let traces = Traces::default();
  let output = Collect::default();

  RepeatShotTask::new(THRESHOLDS, 3)
    .run_task(frames(1), detector(&traces), output.clone())
    .unwrap();

  assert_eq!(traces.forwards(), 3);
  assert_eq!(*output.rendered.borrow(), vec![("frame-0".to_string(), 2)]);
  assert_eq!(traces.dropped.get(), 1);
}

#[test]
fn repeat_shot_runs_at_least_once() {
  let traces = Traces::default();

  RepeatShotTask::new(THRESHOLDS, 0)
    .run_task(frames(1), detector(&traces), Collect::default())
    .unwrap();

  assert_eq!(traces.forwards(), 1);
}

#[test]
fn batch_predict_writes_coco_with_list_ids() {
  let dir = tempfile::tempdir().unwrap();
  let images = image_folder(dir.path());
  let out = dir.path().join("preds.json");
  let labels = Labels::from_lines("cat\ndog\n");
  let exporter = Exporter::new(ExportFormat::Coco, images.len(), &labels, false);
  let traces = Traces::default();

  BatchPredictTask::new(THRESHOLDS, &out)
    .with_max_dets(1)
    .with_progress(false)
    .run_task(images, detector(&traces), exporter)
    .unwrap();

  let doc = read_json(&out);
  let ids: Vec<_> = doc["images"]
    .as_array()
    .unwrap()
    .iter()
    .map(|image| (image["file_name"].as_str().unwrap().to_string(), image["id"].as_u64().unwrap()))
    .collect();
  assert_eq!(ids, vec![("a.png".to_string(), 0), ("b.png".to_string(), 2)]);
  assert_eq!(doc["images"][1]["width"], 64);

  // 每张图只保留分数最高的一个结果
  let anns = doc["annotations"].as_array().unwrap();
  assert_eq!(anns.len(), 2);
  for (ann, image_id) in anns.iter().zip([0, 2]) {
    assert_eq!(ann["image_id"], image_id);
    assert_eq!(ann["category_id"], 1);
    assert!((ann["score"].as_f64().unwrap() - 0.81).abs() < 1e-4);
  }
  assert_eq!(doc["categories"][1]["name"], "dog");
  assert_eq!(traces.forwards(), 2);
  assert_eq!(traces.dropped.get(), 1);
}

#[test]
fn batch_predict_threshold_is_a_score_floor() {
  let dir = tempfile::tempdir().unwrap();
  let images = image_folder(dir.path());
  let out = dir.path().join("dets.json");
  let exporter = Exporter::new(ExportFormat::Coco, images.len(), &Labels::numeric(2), true);
  let traces = Traces::default();
  let thresholds = Thresholds {
    object: 0.7,
    nms: 0.45,
  };

  BatchPredictTask::new(thresholds, &out)
    .with_progress(false)
    .run_task(images, detector(&traces), exporter)
    .unwrap();

  let anns = read_json(&out);
  let anns = anns.as_array().unwrap();
  assert_eq!(anns.len(), 2);
  assert!(anns.iter().all(|ann| ann["score"].as_f64().unwrap() >= 0.7));
  assert!(anns.iter().all(|ann| ann["category_id"] == 1));
}

#[test]
fn batch_predict_writes_cvat() {
  let dir = tempfile::tempdir().unwrap();
  let images = image_folder(dir.path());
  let out = dir.path().join("preds.xml");
  let labels = Labels::from_lines("cat\ndog\n");
  let exporter = Exporter::new(ExportFormat::Cvat, images.len(), &labels, false);
  let traces = Traces::default();

  BatchPredictTask::new(THRESHOLDS, &out)
    .with_progress(false)
    .run_task(images, detector(&traces), exporter)
    .unwrap();

  let xml = std::fs::read_to_string(&out).unwrap();
  assert!(xml.contains("<size>2</size>"));
  assert!(xml.contains("<image id=\"2\" name=\"b.png\" width=\"64\" height=\"48\">"));
  assert_eq!(xml.matches("<box ").count(), 4);
  assert_eq!(xml.matches("label=\"cat\"").count(), 2);
  assert_eq!(xml.matches("label=\"dog\"").count(), 2);
}

#[test]
fn batch_predict_fails_on_missing_image() {
  let dir = tempfile::tempdir().unwrap();
  let list = dir.path().join("val.txt");
  std::fs::write(&list, "missing.png\n").unwrap();
  let images = ImageSet::discover(dir.path(), Some(&list)).unwrap();
  let out = dir.path().join("preds.json");
  let exporter = Exporter::new(ExportFormat::Coco, images.len(), &Labels::numeric(2), false);
  let traces = Traces::default();

  let result = BatchPredictTask::new(THRESHOLDS, &out)
    .with_progress(false)
    .run_task(images, detector(&traces), exporter);

  assert!(result.is_err());
  assert!(!out.exists());
  assert_eq!(traces.forwards(), 0);
}
