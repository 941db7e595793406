mod common;

use common::{page, Project};
use islet::runtime::{
    HmrAction, HmrBroker, HmrMessage, ModuleProgram, ModuleScope, RuntimeError, RuntimeEvent, SynthesizedMain,
    WasmHost,
};
use islet::{Bundler, Reloader, TagParser};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

type Observed = Rc<RefCell<Vec<Option<Value>>>>;

/// First instance saves state; every later instance records what it loads.
struct StatefulHost {
    instances: usize,
    observed: Observed,
}

struct Saver;

impl ModuleProgram for Saver {
    fn run(&mut self, scope: &mut ModuleScope<'_>) {
        scope.save_state("k", &json!({ "count": 1 })).unwrap();
        scope.on_dispose(|scope| {
            scope.save_state("disposed", &true).unwrap();
        });
    }
}

struct Loader(Observed);

impl ModuleProgram for Loader {
    fn run(&mut self, scope: &mut ModuleScope<'_>) {
        self.0.borrow_mut().push(scope.load_state("k"));
    }
}

impl WasmHost for StatefulHost {
    fn instantiate(&mut self, _url: &str) -> Result<Box<dyn ModuleProgram>, RuntimeError> {
        self.instances += 1;
        if self.instances == 1 {
            Ok(Box::new(Saver))
        } else {
            Ok(Box::new(Loader(Rc::clone(&self.observed))))
        }
    }
}

#[test]
fn test_state_survives_wasm_reload() {
    let observed: Observed = Rc::default();
    let mut broker = HmrBroker::new(StatefulHost { instances: 0, observed: Rc::clone(&observed) });

    broker.load("/_assets/wasm/script-aaaaaaaa.wasm", "index.page").unwrap();
    let action = broker.handle(&HmrMessage::WasmReload {
        module_id: "index.page".into(),
        wasm_url: "/_assets/wasm/script-bbbbbbbb.wasm".into(),
        hash: Some("bbbbbbbb".into()),
        replaces: None,
    });

    assert!(matches!(action, HmrAction::Swapped { .. }));
    assert_eq!(*observed.borrow(), vec![Some(json!({ "count": 1 }))]);

    let mut scope = ModuleScope::new(broker.globals_mut(), "", "index.page");
    assert_eq!(scope.load_state::<bool>("disposed"), Some(true));
}

#[test]
fn test_reload_replaces_old_record() {
    let observed: Observed = Rc::default();
    let mut broker = HmrBroker::new(StatefulHost { instances: 0, observed });

    broker.load("/a.wasm", "index.page").unwrap();
    broker.wasm_reload("index.page", "/b.wasm").unwrap();

    let registry = broker.globals_mut().registry();
    assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["_b.wasm"]);
    let events = broker.globals().events();
    let disposed = events
        .iter()
        .position(|e| *e == RuntimeEvent::Disposed { module_id: "index.page".into() })
        .unwrap();
    let instantiated = events
        .iter()
        .rposition(|e| *e == RuntimeEvent::Instantiated { key: "_b.wasm".into() })
        .unwrap();
    assert!(disposed < instantiated);
}

/// Fails every instantiation of one URL.
struct FlakyHost {
    broken: String,
    runs: Rc<RefCell<HashMap<String, usize>>>,
}

struct Counter(String, Rc<RefCell<HashMap<String, usize>>>);

impl ModuleProgram for Counter {
    fn run(&mut self, _scope: &mut ModuleScope<'_>) {
        *self.1.borrow_mut().entry(self.0.clone()).or_default() += 1;
    }
}

impl WasmHost for FlakyHost {
    fn instantiate(&mut self, url: &str) -> Result<Box<dyn ModuleProgram>, RuntimeError> {
        if url == self.broken {
            return Err(RuntimeError::Instantiate { url: url.into(), message: "404".into() });
        }
        Ok(Box::new(Counter(url.to_string(), Rc::clone(&self.runs))))
    }
}

#[test]
fn test_failed_module_does_not_break_others() {
    let runs: Rc<RefCell<HashMap<String, usize>>> = Rc::default();
    let mut broker = HmrBroker::new(FlakyHost { broken: "/bad.wasm".into(), runs: Rc::clone(&runs) });

    assert!(broker.load("/bad.wasm", "index.page").is_err());
    broker.load("/good.wasm", "index.page").unwrap();
    assert_eq!(runs.borrow().get("/good.wasm"), Some(&1));

    // A reload to a broken artifact falls back to a full page reload.
    let action = broker.handle(&HmrMessage::WasmReload {
        module_id: "index.page".into(),
        wasm_url: "/bad.wasm".into(),
        hash: None,
        replaces: None,
    });
    assert_eq!(action, HmrAction::FullReload);
}

fn reloader(project: &Project) -> Reloader {
    let bundler = Arc::new(Bundler::new(project.config.out_dir.clone(), project.compiler.clone()));
    Reloader::new(bundler, Arc::new(TagParser), project.config.pages_dir.clone())
}

const GO: &str = "lang=\"go\"";

#[tokio::test]
async fn test_reloader_emits_wasm_reload_for_new_hashes() {
    let project = Project::new();
    let mut reloader = reloader(&project);
    let path = project.write_page("index.page", &page("", &[(GO, "println(1)")]));

    let first = reloader.page_changed(&path).await;
    assert_eq!(first.len(), 1);
    let HmrMessage::WasmReload { module_id, wasm_url, hash, replaces } = &first[0] else {
        panic!("expected wasm_reload, got {:?}", first[0]);
    };
    assert_eq!(module_id, "index.page");
    let hash = hash.clone().unwrap();
    assert_eq!(wasm_url, &format!("/_assets/wasm/script-{}.wasm", hash));
    assert_eq!(replaces, &None);

    // Saving without changes swaps nothing.
    assert!(reloader.page_changed(&path).await.is_empty());

    std::fs::write(&path, page("", &[(GO, "println(2)")])).unwrap();
    let second = reloader.page_changed(&path).await;
    assert_eq!(second.len(), 1);
    let old_url = format!("/_assets/wasm/script-{}.wasm", hash);
    assert!(matches!(
        &second[0],
        HmrMessage::WasmReload { hash: Some(h), replaces: Some(old), .. } if *h != hash && *old == old_url
    ));
    assert_eq!(reloader.manifest().len(), 1);
}

/// Instances record their URL when run; every module registers its own
/// accept handler the way interop bodies do.
struct RecordingHost(Rc<RefCell<Vec<String>>>);

impl WasmHost for RecordingHost {
    fn instantiate(&mut self, url: &str) -> Result<Box<dyn ModuleProgram>, RuntimeError> {
        let runs = Rc::clone(&self.0);
        let url = url.to_string();
        Ok(Box::new(SynthesizedMain::with_interop(move |scope| {
            scope.listen("#counter", "click");
            runs.borrow_mut().push(url.clone());
        })))
    }
}

#[tokio::test]
async fn test_editing_one_of_two_scripts_keeps_the_other_running() {
    let project = Project::new();
    let mut reloader = reloader(&project);
    let path = project.write_page("index.page", &page("", &[(GO, "println(1)"), (GO, "println(2)")]));

    // The first build of a page with two modules reloads it.
    assert_eq!(reloader.page_changed(&path).await, vec![HmrMessage::Reload]);
    let before = reloader.manifest().resolve("index.page").unwrap().wasm_modules.clone();
    assert_eq!(before.len(), 2);

    let runs: Rc<RefCell<Vec<String>>> = Rc::default();
    let mut broker = HmrBroker::new(RecordingHost(Rc::clone(&runs)));
    for asset in &before {
        broker.load(&asset.wasm_path, "index.page").unwrap();
    }

    std::fs::write(&path, page("", &[(GO, "println(1)"), (GO, "println(3)")])).unwrap();
    let messages = reloader.page_changed(&path).await;
    assert_eq!(messages.len(), 1);
    assert!(matches!(broker.handle(&messages[0]), HmrAction::Swapped { .. }));

    let after = reloader.manifest().resolve("index.page").unwrap().wasm_modules.clone();
    let mut expected: Vec<String> = [&after[0], &after[1]].iter().map(|a| a.wasm_path.replace('/', "_")).collect();
    expected.sort();
    let loaded: Vec<String> = broker.globals_mut().registry().keys().cloned().collect();
    assert_eq!(loaded, expected);
    assert_eq!(after[0].hash, before[0].hash);
    // The untouched module ran once; the new one ran, then was accepted.
    assert_eq!(runs.borrow().iter().filter(|url| **url == before[0].wasm_path).count(), 1);
    assert_eq!(runs.borrow().iter().filter(|url| **url == after[1].wasm_path).count(), 2);

    // Dropping a script reloads the page rather than leaving it running.
    std::fs::write(&path, page("", &[(GO, "println(1)")])).unwrap();
    assert_eq!(reloader.page_changed(&path).await, vec![HmrMessage::Reload]);
}

#[tokio::test]
async fn test_reloader_reports_build_failure() {
    let project = Project::new();
    let mut reloader = reloader(&project);
    let path = project.write_page("index.page", &page("", &[(GO, "fmt.Println(\"oops)")]));

    let messages = reloader.page_changed(&path).await;
    let [HmrMessage::Error { message }] = messages.as_slice() else {
        panic!("expected one error, got {:?}", messages);
    };
    assert!(message.contains("compile failed"));
}

#[tokio::test]
async fn test_reloader_full_reload_without_wasm() {
    let project = Project::new();
    let mut reloader = reloader(&project);
    let path = project.write_page("about.page", &page("about", &[("type=\"module\"", "console.log(1)")]));

    assert_eq!(reloader.page_changed(&path).await, vec![HmrMessage::Reload]);
    assert!(reloader.page_changed(Path::new("/nonexistent/x.page")).await[0]
        .to_json()
        .unwrap()
        .starts_with("{\"type\":\"error\""));
}
