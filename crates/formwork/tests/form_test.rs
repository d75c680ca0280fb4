mod common;

use common::{init_tracing, params, TestEnv};
use formwork::form::validators;
use formwork::store::{MemoryStore, Model};
use formwork::transaction::TransactionContext;
use formwork::{
    AttributeType, Entity, EntityError, ErrorSet, Expose, Form, FormError, FormType, RecordId,
    SharedEntity, Value,
};
use serde_json::json;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

fn customer_form() -> Rc<FormType> {
    let mut form = FormType::new("CustomerForm");
    form.identity_from("customer");
    form.expose(["name", "email"], Expose::default()).unwrap();
    form.expose(["phone_number"], Expose::default().alias("mobile_number"))
        .unwrap();
    form.expose(["friendly"], Expose::default()).unwrap();
    Rc::new(form)
}

/// A house listing with its vendor's contact details.
fn listing_form_type() -> FormType {
    let mut form = FormType::new("HouseListingForm");
    form.identity_from("house");
    form.expose(["street_number", "street_name", "city"], Expose::default())
        .unwrap();
    form.expose(["name", "phone_number"], Expose::on("vendor").prefix("vendor_"))
        .unwrap();
    form
}

fn listing_form() -> Rc<FormType> {
    Rc::new(listing_form_type())
}

fn valid_customer_params() -> Value {
    params(json!({
        "name": "Ann",
        "email": "ann@example.com",
        "mobile_number": "555-0199"
    }))
}

#[test]
fn test_exposed_attributes_delegate_to_the_entity() {
    init_tracing();
    let env = TestEnv::new();
    let customer = env.new_customer();
    let mut form = Form::wrap(&customer_form(), customer.clone()).unwrap();

    form.write("mobile_number", "555-0199").unwrap();

    assert_eq!(customer.borrow().get("phone_number"), Value::from("555-0199"));
    assert_eq!(form.read("mobile_number").unwrap(), Value::from("555-0199"));
    assert!(form.changed("mobile_number").unwrap());
    assert_eq!(form.was("mobile_number").unwrap(), Value::Null);
    assert!(form.query("friendly").unwrap());
    assert!(!form.changed("friendly").unwrap());
}

#[test]
fn test_unexposed_names_are_missing_methods() {
    let env = TestEnv::new();
    let form = Form::wrap(&customer_form(), env.new_customer()).unwrap();

    assert_eq!(
        form.read("phone_number").unwrap_err(),
        FormError::NoMethod {
            form: "CustomerForm".into(),
            method: "phone_number".into()
        }
    );
    assert!(!form.respond_to("phone_number"));
    assert!(form.respond_to("mobile_number="));
    assert!(form.respond_to("name_changed?"));
    assert!(form.respond_to("persisted?"));
}

#[test]
fn test_call_dispatches_generated_methods() {
    let env = TestEnv::new();
    let mut form = Form::wrap(&customer_form(), env.new_customer()).unwrap();

    form.call("name=", Some(Value::from("Ann"))).unwrap();
    assert_eq!(form.call("name", None).unwrap(), Value::from("Ann"));
    assert_eq!(form.call("name?", None).unwrap(), Value::Bool(true));
    assert_eq!(form.call("name_changed?", None).unwrap(), Value::Bool(true));
    assert_eq!(form.call("name_was", None).unwrap(), Value::Null);
    assert_eq!(form.call("new_record?", None).unwrap(), Value::Bool(true));
    assert!(matches!(form.call("name=", None), Err(FormError::Argument(_))));
    assert!(matches!(
        form.call("destroy_everything", None),
        Err(FormError::NoMethod { .. })
    ));
}

#[test]
fn test_attributes_lists_names_in_declaration_order() {
    let env = TestEnv::new();
    let mut form = Form::wrap(&customer_form(), env.new_customer()).unwrap();
    form.assign_attributes(valid_customer_params()).unwrap();

    assert_eq!(
        form.attribute_names(),
        ["name", "email", "mobile_number", "friendly"]
    );
    let attributes = form.attributes().unwrap();
    assert_eq!(attributes["mobile_number"], Value::from("555-0199"));
    assert_eq!(attributes["friendly"], Value::Bool(true));
}

#[test]
fn test_errors_are_renamed_and_ordered() {
    let env = TestEnv::new();
    let mut form = Form::wrap(&customer_form(), env.new_customer()).unwrap();
    form.write("friendly", false).unwrap();

    assert!(!form.valid().unwrap());
    assert!(form.invalid().unwrap());
    let errors = form.errors();
    assert_eq!(
        errors.keys().collect::<Vec<_>>(),
        ["base", "name", "email", "mobile_number"]
    );
    assert_eq!(errors.get("mobile_number"), ["can't be blank"]);
    assert!(!errors.contains("phone_number"));
    assert_eq!(
        errors.full_messages(),
        [
            "Customer needs to be friendly",
            "Name can't be blank",
            "Email can't be blank",
            "Mobile number can't be blank"
        ]
    );
    assert!(!form.form_errors());
}

#[test]
fn test_stale_errors_do_not_reappear() {
    let env = TestEnv::new();
    let mut form = Form::wrap(&customer_form(), env.new_customer()).unwrap();

    assert!(!form.valid().unwrap());
    assert!(form.errors().contains("name"));

    form.assign_attributes(valid_customer_params()).unwrap();
    assert!(form.valid().unwrap());
    assert!(form.errors().is_empty());

    form.reset_errors();
    assert!(form.errors().is_empty());
}

#[test]
fn test_save_persists_and_reports_identity() {
    let env = TestEnv::new();
    let mut form = Form::wrap(&customer_form(), env.new_customer()).unwrap();
    assert_eq!(form.to_key().unwrap(), None);
    assert_eq!(form.to_param().unwrap(), None);

    form.assign_attributes(valid_customer_params()).unwrap();
    form.save().unwrap();

    let id = form.id().unwrap().expect("saved customer has an id");
    assert!(form.persisted().unwrap());
    assert!(!form.new_record().unwrap());
    assert_eq!(form.to_key().unwrap(), Some(vec![id]));
    assert_eq!(form.to_param().unwrap(), Some(id.to_string()));
    assert!(!form.changed("name").unwrap());
    assert_eq!(env.store.count("customers"), 1);
    assert_eq!(env.store.depth(), 0);
}

#[test]
fn test_save_raises_on_validation_failure() {
    let env = TestEnv::new();
    let mut form = Form::wrap(&customer_form(), env.new_customer()).unwrap();

    match form.save().unwrap_err() {
        FormError::Invalid(failure) => {
            assert_eq!(failure.form, "CustomerForm");
            assert_eq!(failure.errors.get("name"), ["can't be blank"]);
            assert!(!failure.form_errors);
            assert!(failure.to_string().starts_with("Validation failed: Name can't be blank"));
        }
        other => panic!("expected a validation failure, got {other:?}"),
    }
    assert!(!form.save_if_valid().unwrap());
    assert_eq!(env.store.count("customers"), 0);
    assert_eq!(env.store.depth(), 0);
}

#[test]
fn test_update_assigns_and_saves() {
    let env = TestEnv::new();
    let customer = env.create_customer("Ann");
    let mut form = Form::wrap(&customer_form(), customer.clone()).unwrap();

    assert!(form.update_if_valid(params(json!({"name": "Annie"}))).unwrap());
    let id = form.id().unwrap().unwrap();
    let row = env.store.fetch("customers", id).unwrap();
    assert_eq!(row["name"], Value::from("Annie"));

    assert!(!form.update_if_valid(params(json!({"email": ""}))).unwrap());
    let row = env.store.fetch("customers", id).unwrap();
    assert_eq!(row["email"], Value::from("ann@example.com"));
}

#[test]
fn test_bulk_assignment_requires_a_map_of_known_names() {
    let env = TestEnv::new();
    let mut form = Form::wrap(&customer_form(), env.new_customer()).unwrap();

    assert_eq!(
        form.assign_attributes(Value::from("name=Ann")).unwrap_err(),
        FormError::Argument(
            "When assigning attributes, you must pass a map as an argument".into()
        )
    );
    assert_eq!(
        form.assign_attributes(params(json!({"phone_number": "1"})))
            .unwrap_err(),
        FormError::NoMethod {
            form: "CustomerForm".into(),
            method: "phone_number=".into()
        }
    );
}

#[test]
fn test_invalid_multi_entity_submission_leaves_storage_alone() {
    let env = TestEnv::new();
    let vendor = env.create_customer("Vic");
    let vendor_id = vendor.borrow().get("id").to_integer_lossy();
    let house = env.create_house_with_rooms(&[]);
    let mut form = Form::builder(&listing_form())
        .entity("house", house)
        .entity("vendor", vendor)
        .build()
        .unwrap();

    let saved = form
        .update_if_valid(params(json!({"vendor_name": "", "vendor_phone_number": "555"})))
        .unwrap();

    assert!(!saved);
    assert_eq!(form.errors().get("vendor_name"), ["can't be blank"]);
    let row = env.store.fetch("customers", vendor_id).unwrap();
    assert_eq!(row["phone_number"], Value::from("555-0100"));
}

#[test]
fn test_multi_entity_save_is_all_or_nothing() {
    for failing in ["houses", "customers"] {
        let env = TestEnv::new();
        let vendor = env.create_customer("Vic");
        let vendor_id = vendor.borrow().get("id").to_integer_lossy();
        let house = env.create_house_with_rooms(&[]);
        let house_id = house.borrow().get("id").to_integer_lossy();
        let mut form = Form::builder(&listing_form())
            .entity("house", house)
            .entity("vendor", vendor)
            .build()
            .unwrap();

        env.store.set_simulate_write_error(failing, true);
        let err = form
            .update(params(json!({"street_name": "Elm Street", "vendor_name": "Victor"})))
            .unwrap_err();

        assert!(matches!(err, FormError::Entity(EntityError::Store(_))), "{failing}: {err}");
        assert!(!err.is_invalid());
        let house_row = env.store.fetch("houses", house_id).unwrap();
        let vendor_row = env.store.fetch("customers", vendor_id).unwrap();
        assert_eq!(house_row["street_name"], Value::from("Main Street"), "{failing}");
        assert_eq!(vendor_row["name"], Value::from("Vic"), "{failing}");
        assert_eq!(env.store.depth(), 0);
    }
}

#[test]
fn test_one_scope_per_distinct_store() {
    let env = TestEnv::new();
    let vendor_store = Rc::new(MemoryStore::new());
    let vendor = Model::create(
        &vendor_store,
        &env.customers,
        [
            ("name", Value::from("Vic")),
            ("email", Value::from("vic@example.com")),
            ("phone_number", Value::from("555-0100")),
        ],
    )
    .unwrap();
    let vendor_id = vendor.borrow().get("id").to_integer_lossy();
    let house = env.create_house_with_rooms(&[]);
    let house_id = house.borrow().get("id").to_integer_lossy();

    let depths = Rc::new(RefCell::new(Vec::new()));
    let mut form_type = listing_form_type();
    let (seen, houses, vendors) = (
        Rc::clone(&depths),
        Rc::clone(&env.store),
        Rc::clone(&vendor_store),
    );
    form_type.before_save(move |_| {
        seen.borrow_mut().push((houses.depth(), vendors.depth()));
        Ok(())
    });
    let mut form = Form::builder(&Rc::new(form_type))
        .entity("house", house)
        .entity("vendor", vendor)
        .build()
        .unwrap();

    form.write("street_name", "Elm Street").unwrap();
    form.save().unwrap();
    assert_eq!(*depths.borrow(), [(1, 1)]);

    vendor_store.set_simulate_write_error("customers", true);
    let err = form
        .update(params(json!({"street_name": "Oak Street", "vendor_name": "Victor"})))
        .unwrap_err();

    assert!(matches!(err, FormError::Entity(EntityError::Store(_))));
    let house_row = env.store.fetch("houses", house_id).unwrap();
    let vendor_row = vendor_store.fetch("customers", vendor_id).unwrap();
    assert_eq!(house_row["street_name"], Value::from("Elm Street"));
    assert_eq!(vendor_row["name"], Value::from("Vic"));
    assert_eq!(env.store.depth(), 0);
    assert_eq!(vendor_store.depth(), 0);
}

/// A record kept outside any store, so it has no unit of work of its own.
#[derive(Default)]
struct Note {
    fields: HashMap<String, Value>,
    id: Option<RecordId>,
    fail_writes: bool,
    errors: ErrorSet,
    marked: bool,
}

impl Entity for Note {
    fn entity_name(&self) -> &str {
        "notes"
    }

    fn read(&self, field: &str) -> Result<Value, EntityError> {
        Ok(self.fields.get(field).cloned().unwrap_or_default())
    }

    fn read_before_type_cast(&self, field: &str) -> Result<Value, EntityError> {
        self.read(field)
    }

    fn write(&mut self, field: &str, value: Value) -> Result<(), EntityError> {
        self.fields.insert(field.to_string(), value);
        Ok(())
    }

    fn changed(&self, _field: &str) -> Result<bool, EntityError> {
        Ok(false)
    }

    fn previous_value(&self, field: &str) -> Result<Value, EntityError> {
        self.read(field)
    }

    fn validate(&mut self) -> bool {
        true
    }

    fn errors(&self) -> &ErrorSet {
        &self.errors
    }

    fn persist(&mut self) -> Result<(), EntityError> {
        if self.fail_writes {
            return Err(EntityError::Store("notes are read-only".into()));
        }
        self.id = Some(1);
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), EntityError> {
        self.id = None;
        Ok(())
    }

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn persisted(&self) -> bool {
        self.id.is_some()
    }

    fn mark_for_destruction(&mut self) {
        self.marked = true;
    }

    fn marked_for_destruction(&self) -> bool {
        self.marked
    }
}

#[derive(Default)]
struct RecordingTransaction {
    log: RefCell<Vec<&'static str>>,
}

impl TransactionContext for RecordingTransaction {
    fn begin(&self) {
        self.log.borrow_mut().push("begin");
    }

    fn commit(&self) -> Result<(), EntityError> {
        self.log.borrow_mut().push("commit");
        Ok(())
    }

    fn rollback(&self) {
        self.log.borrow_mut().push("rollback");
    }
}

#[test]
fn test_entities_without_a_context_use_the_fallback_scope() {
    let mut form_type = FormType::new("NoteForm");
    form_type.identity_from("note");
    form_type.expose(["body"], Expose::default()).unwrap();
    let form_type = Rc::new(form_type);

    for fail_writes in [false, true] {
        let fallback = Rc::new(RecordingTransaction::default());
        let note: SharedEntity = Rc::new(RefCell::new(Note {
            fail_writes,
            ..Note::default()
        }));
        let mut form = Form::builder(&form_type)
            .entity("note", note)
            .fallback_transaction(fallback.clone())
            .build()
            .unwrap();

        form.write("body", "remember the milk").unwrap();
        let result = form.save();

        if fail_writes {
            assert!(matches!(result, Err(FormError::Entity(EntityError::Store(_)))));
            assert_eq!(*fallback.log.borrow(), ["begin", "rollback"]);
        } else {
            result.unwrap();
            assert!(form.persisted().unwrap());
            assert_eq!(*fallback.log.borrow(), ["begin", "commit"]);
        }
    }
}

#[test]
fn test_every_declared_entity_must_be_bound() {
    let env = TestEnv::new();
    let err = Form::builder(&listing_form())
        .entity("house", env.new_house())
        .build()
        .unwrap_err();

    assert_eq!(
        err,
        FormError::UnboundEntity {
            form: "HouseListingForm".into(),
            key: "vendor".into()
        }
    );
}

fn change_password_form() -> Rc<FormType> {
    let mut form = FormType::new("ChangePasswordForm");
    form.attribute("password", AttributeType::string()).unwrap();
    form.attribute("password_confirmation", AttributeType::string())
        .unwrap();
    form.validates(validators::presence_of(["password"]));
    form.validates(validators::confirmation_of("password"));
    form.before_save(|form| {
        let digest = format!("digest:{}", form.read("password")?);
        let customer = Rc::clone(form.entity("customer")?);
        let mut customer = customer.borrow_mut();
        customer.write("password_digest", Value::from(digest))?;
        customer.persist()?;
        Ok(())
    });
    Rc::new(form)
}

#[test]
fn test_modelless_form_validates_its_own_attributes() {
    let env = TestEnv::new();
    let mut form = Form::builder(&change_password_form())
        .entity("customer", env.create_customer("Ann"))
        .build()
        .unwrap();
    form.assign_attributes(params(json!({
        "password": "secret",
        "password_confirmation": "secrte"
    })))
    .unwrap();

    assert!(!form.save_if_valid().unwrap());
    assert_eq!(form.errors().get("password_confirmation"), ["doesn't match"]);
    assert!(form.form_errors());
}

#[test]
fn test_modelless_form_saves_through_its_callbacks() {
    let env = TestEnv::new();
    let customer = env.create_customer("Ann");
    let mut form = Form::builder(&change_password_form())
        .entity("customer", customer.clone())
        .build()
        .unwrap();
    form.assign_attributes(params(json!({
        "password": "secret",
        "password_confirmation": "secret"
    })))
    .unwrap();
    assert!(form.changed("password").unwrap());

    form.save().unwrap();

    assert!(!form.changed("password").unwrap());
    assert_eq!(form.was("password").unwrap(), Value::from("secret"));
    let id = customer.borrow().get("id").to_integer_lossy();
    let row = env.store.fetch("customers", id).unwrap();
    assert_eq!(row["password_digest"], Value::from("digest:secret"));
    assert!(matches!(form.persisted(), Err(FormError::NoMethod { .. })));
}

#[test]
fn test_introduced_attributes_cast_lazily() {
    let mut ty = FormType::new("SearchForm");
    ty.attribute("page", AttributeType::integer().with_default(Value::Int(1)))
        .unwrap();
    ty.attribute("exact", AttributeType::boolean()).unwrap();
    let mut form = Form::builder(&Rc::new(ty)).build().unwrap();

    assert_eq!(form.read("page").unwrap(), Value::Int(1));
    form.write("page", "0").unwrap();
    assert_eq!(form.read("page").unwrap(), Value::Int(0));
    assert_eq!(form.read_before_type_cast("page").unwrap(), Value::from("0"));
    assert!(form.changed("page").unwrap());
    assert_eq!(form.was("page").unwrap(), Value::Int(1));

    form.write("exact", "false").unwrap();
    assert!(!form.query("exact").unwrap());
    assert_eq!(form.read("exact").unwrap(), Value::Bool(false));
}

#[test]
fn test_specialized_forms_extend_their_base() {
    let mut base = FormType::new("CustomerForm");
    base.identity_from("customer");
    base.expose(["name"], Expose::default()).unwrap();

    let mut admin = base.specialize("AdminCustomerForm");
    admin.expose(["email", "friendly"], Expose::default()).unwrap();

    assert_eq!(base.attribute_names(), ["name"]);
    assert_eq!(admin.attribute_names(), ["name", "email", "friendly"]);

    let env = TestEnv::new();
    let mut form = Form::wrap(&Rc::new(admin), env.new_customer()).unwrap();
    form.write("email", "root@example.com").unwrap();
    assert!(form.errors().is_empty());
    assert!(!form.valid().unwrap());
    assert_eq!(form.errors().get("name"), ["can't be blank"]);
}
