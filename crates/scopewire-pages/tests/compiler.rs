//! Integration tests for compiling whole pages

use std::cell::RefCell;
use std::rc::Rc;

use rstest::{fixture, rstest};
use scopewire_core::{ChangeEvent, Observer, Scope, ScopeFunction, Value};
use scopewire_pages::{
	Compiler, ControllerError, ControllerRegistry, DirectiveContext, DirectiveDefinition, DirectiveError,
	DirectiveRegistry, Document, DomEvent, MemoryBackend, PagesError, Storage,
};

const WATCHLIST: &str = r#"
<section controller="watchlist">
	<h1 scope-text="title"></h1>
	<input scope-value="filter">
	<ul>
		<li scope-repeat="(pair, quote) in quotes">
			<b scope-text="pair"></b>:<i scope-text="quote"></i>
			<button on-click="removed = pair"></button>
		</li>
	</ul>
	<button class="add" on-click="quotes.USDJPY = 151"></button>
</section>
"#;

#[fixture]
fn controllers() -> ControllerRegistry {
	let mut controllers = ControllerRegistry::new();
	controllers.register("watchlist", |scope: &Scope| {
		scope.set("title", "Watchlist");
		scope.set("filter", "");
		scope.set("removed", Value::Null);
		scope.set("quotes", Observer::mapping_from([("EURUSD", 1.08), ("GBPUSD", 1.27)]));
		Ok(())
	});
	controllers
}

fn quotes(document: &Document) -> Vec<String> {
	document.root().find_by_tag("li").iter().map(|li| li.text_content().split_whitespace().collect::<String>()).collect()
}

#[rstest]
fn test_watchlist_page(controllers: ControllerRegistry) {
	// Arrange
	let compiler = Compiler::new(DirectiveRegistry::with_builtins(), controllers);
	let document = Document::from_html(WATCHLIST).unwrap();

	// Act
	let report = compiler.compile(&document.root(), None);

	// Assert
	assert!(report.is_ok(), "{:?}", report.errors);
	assert_eq!(report.controllers_bound, 1);
	assert_eq!(report.directives_built, 1);
	let section = document.root().find_by_tag("section").remove(0);
	let scope = section.scope().unwrap();
	assert_eq!(document.root().find_by_tag("h1")[0].text_content(), "Watchlist");
	assert_eq!(quotes(&document), vec!["EURUSD:1.08", "GBPUSD:1.27"]);
	assert_eq!(scope.get("filter"), Some(Value::from("")));
}

#[rstest]
fn test_watchlist_reacts_to_clicks_and_input(controllers: ControllerRegistry) {
	// Arrange
	let compiler = Compiler::new(DirectiveRegistry::with_builtins(), controllers);
	let document = Document::from_html(WATCHLIST).unwrap();
	compiler.compile(&document.root(), None).into_result().unwrap();
	let scope = document.root().find_by_tag("section")[0].scope().unwrap();
	let input = document.root().find_by_tag("input").remove(0);

	// Act
	document.root().find_by_attribute("class")[0].click();
	document.root().find_by_tag("li")[1].find_by_tag("button")[0].click();
	input.set_value("USD").unwrap();
	input.fire("change");

	// Assert
	assert_eq!(quotes(&document), vec!["EURUSD:1.08", "GBPUSD:1.27", "USDJPY:151"]);
	assert_eq!(scope.get("removed"), Some(Value::from("GBPUSD")));
	assert_eq!(scope.get("filter"), Some(Value::from("USD")));
}

#[rstest]
fn test_faults_do_not_stop_the_rest_of_the_page() {
	// Arrange
	let mut controllers = ControllerRegistry::new();
	controllers.register("broken", |_: &Scope| Err(ControllerError::new("feed unavailable")));
	controllers.register("fine", |scope: &Scope| {
		scope.set("status", "ok");
		Ok(())
	});
	let compiler = Compiler::new(DirectiveRegistry::with_builtins(), controllers);
	let document = Document::from_html(
		r#"<div controller="missing"></div><div controller="broken"></div><p controller="fine" scope-text="status"></p>"#,
	)
	.unwrap();

	// Act
	let report = compiler.compile(&document.root(), None);

	// Assert
	assert_eq!(report.controllers_bound, 2);
	assert_eq!(document.root().find_by_tag("p")[0].text_content(), "ok");
	assert!(matches!(&report.errors[0], PagesError::UnknownController(name) if name == "missing"));
	assert!(matches!(&report.errors[1], PagesError::Controller { name, .. } if name == "broken"));
	assert!(report.into_result().is_err());
}

#[rstest]
fn test_custom_directive_receives_its_parameter() {
	// Arrange
	let seen = Rc::new(RefCell::new(Vec::new()));
	let sink = seen.clone();
	let mut directives = DirectiveRegistry::with_builtins();
	directives.register(
		"tooltipText",
		DirectiveDefinition::from_link(move |context: &DirectiveContext<'_>| -> Result<(), DirectiveError> {
			sink.borrow_mut().push((context.name.to_string(), context.parameter.to_string()));
			context.element.set_attribute("title", context.parameter)?;
			Ok(())
		}),
	);
	let compiler = Compiler::new(directives, ControllerRegistry::new());
	let document = Document::from_html(r#"<span tooltip-text="Spread in pips"></span>"#).unwrap();

	// Act
	compiler.compile(&document.root(), Some(&Scope::new()));

	// Assert
	assert_eq!(*seen.borrow(), vec![("tooltipText".to_string(), "Spread in pips".to_string())]);
	assert_eq!(
		document.root().first_child().unwrap().attribute("title").as_deref(),
		Some("Spread in pips")
	);
}

#[rstest]
fn test_on_event_and_storage_round_trip() {
	// Arrange
	let backend = MemoryBackend::new();
	let storage = Storage::new(backend.clone());
	let selected = Rc::new(RefCell::new(Vec::new()));
	let sink = selected.clone();
	let _subscription = storage.container().observe_key("pair", move |event: &ChangeEvent| {
		sink.borrow_mut().push(event.new_value().cloned());
	});

	let scope = Scope::new();
	let store = storage.clone();
	scope.set(
		"remember",
		ScopeFunction::action(move |args: &[Value]| {
			let pair = args.first().cloned().unwrap_or_default();
			let _ = store.set("pair", pair);
		}),
	);
	let compiler = Compiler::new(DirectiveRegistry::with_builtins(), ControllerRegistry::new());
	let document = Document::from_html(r#"<li on-event="pick:remember"></li>"#).unwrap();
	let item = document.root().first_child().unwrap();
	compiler.compile(&document.root(), Some(&scope));

	// Act
	item.dispatch(&DomEvent::new("pick", item.clone()).with_detail("EUR/USD"));

	// Assert
	assert_eq!(backend.raw("pair").as_deref(), Some(r#""EUR/USD""#));
	assert_eq!(*selected.borrow(), vec![Some(Value::from("EUR/USD"))]);
}
