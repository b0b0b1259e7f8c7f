//! Todo list built from identity-stable cells and computed chains

use ripple::{computed, flush, observable, observable_with, subscriber, Observable, Options};

#[derive(Clone)]
struct Todo {
    title: Observable<String>,
    completed: Observable<bool>,
}

impl PartialEq for Todo {
    fn eq(&self, other: &Self) -> bool {
        self.title.as_subscribable() == other.title.as_subscribable()
    }
}

impl Todo {
    fn new(id: usize, title: &str) -> Self {
        let key = format!("todo.{id}");
        Todo {
            title: observable_with(title.to_string(), Options::new().id(format!("{key}.title"))),
            completed: observable_with(false, Options::new().id(format!("{key}.completed"))),
        }
    }
}

fn main() {
    println!("=== Reactive Todos ===\n");

    let todos: Observable<Vec<Todo>> = observable(Vec::new());

    let active = computed({
        let todos = todos.clone();
        move || {
            let mut list: Vec<Todo> = todos
                .get()
                .into_iter()
                .filter(|todo| !todo.completed.get())
                .collect();
            list.sort_by_key(|todo| todo.title.get());
            list
        }
    });

    let print_active = {
        let active = active.clone();
        subscriber(move || {
            println!("active todos:");
            for todo in active.get() {
                println!("  - {}", todo.title.get());
            }
        })
    };
    active.subscribe(&print_active);

    for (index, title) in ["Paint the house", "Mow the lawn", "Buy garden plants"]
        .iter()
        .enumerate()
    {
        let todo = Todo::new(index, title);
        todos.update(|list| list.push(todo.clone()));
    }
    flush();

    println!("\nCompleting \"Mow the lawn\":");
    if let Some(todo) = todos
        .get()
        .iter()
        .find(|todo| todo.title.get() == "Mow the lawn")
    {
        todo.completed.set(true);
    }
    flush();
}
