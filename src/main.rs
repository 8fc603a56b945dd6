use cofiber::{Fiber, Mutex, Scheduler, Semaphore};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// A mailbox built from one mutex and one semaphore: the mutex guards the
/// message queue, the semaphore counts available messages.
struct Mailbox<T> {
    lock: Mutex,
    available: Semaphore,
    messages: RefCell<VecDeque<T>>,
}

impl<T> Mailbox<T> {
    fn new() -> Self {
        Mailbox {
            lock: Mutex::new(),
            available: Semaphore::new(),
            messages: RefCell::new(VecDeque::new()),
        }
    }

    fn post(&self, message: T) {
        self.lock.acquire();
        self.messages.borrow_mut().push_back(message);
        self.lock.release();
        self.available.post();
    }

    fn wait(&self) -> T {
        self.available.wait();
        self.lock.acquire();
        // Hold the lock across a yield on purpose: consumers exercise the
        // holder-yield path every time they drain a message.
        Fiber::yield_now();
        let message = self
            .messages
            .borrow_mut()
            .pop_front()
            .expect("semaphore said a message was available");
        self.lock.release();
        message
    }
}

fn main() {
    println!("Cofiber - Cooperative User-Space Fiber Runtime\n");

    // Example 1: ten fibers interleaving on one OS thread
    println!("Example 1: Ten printers");
    let finished = Rc::new(Cell::new(0u32));
    for digit in 0..10u8 {
        let finished = finished.clone();
        Fiber::spawn(move || {
            for round in 0..16 {
                print!("{}", digit);
                if round % 4 == 0 {
                    Fiber::yield_now();
                }
            }
            finished.set(finished.get() + 1);
        });
    }
    Scheduler::run();
    println!("\n  {} fibers finished\n", finished.get());

    // Example 2: recursive mutex with three contenders
    println!("Example 2: Recursive mutex");
    let mutex = Rc::new(Mutex::new());

    let m = mutex.clone();
    Fiber::spawn(move || {
        println!("  fiber 1 acquiring");
        m.acquire();
        Fiber::yield_now();
        println!("  fiber 1 acquiring again (recursive)");
        m.acquire();
        Fiber::yield_now();
        m.release();
        Fiber::yield_now();
        m.release();
        println!("  fiber 1 released twice, exiting");
    });

    for id in [2, 3] {
        let m = mutex.clone();
        Fiber::spawn(move || {
            println!("  fiber {} acquiring", id);
            m.acquire();
            println!("  fiber {} acquired", id);
            Fiber::yield_now();
            m.release();
            println!("  fiber {} released, exiting", id);
        });
    }
    Scheduler::run();
    println!();

    // Example 3: producer/consumer mailbox from a mutex and a semaphore
    println!("Example 3: Mailbox");
    let mailbox = Rc::new(Mailbox::new());
    let produced = Rc::new(Cell::new(0u32));
    let consumed = Rc::new(Cell::new(0u32));

    const PRODUCERS: u32 = 3;
    const CONSUMERS: u32 = 2;
    const MESSAGES_EACH: u32 = 100;

    for producer in 0..PRODUCERS {
        let mailbox = mailbox.clone();
        let produced = produced.clone();
        Fiber::spawn(move || {
            for message in 0..MESSAGES_EACH {
                mailbox.post(Some((producer, message)));
                if message % 2 == 0 {
                    Fiber::yield_now();
                }
            }
            produced.set(produced.get() + 1);
        });
    }

    for _ in 0..CONSUMERS {
        let mailbox = mailbox.clone();
        let consumed = consumed.clone();
        Fiber::spawn(move || loop {
            match mailbox.wait() {
                Some(_) => consumed.set(consumed.get() + 1),
                None => break,
            }
        });
    }

    // Coordinator: once the producers are done, one sentinel per consumer.
    let mailbox_clone = mailbox.clone();
    let produced_clone = produced.clone();
    Fiber::spawn(move || {
        while produced_clone.get() != PRODUCERS {
            Fiber::yield_now();
        }
        for _ in 0..CONSUMERS {
            mailbox_clone.post(None);
        }
    });

    Scheduler::run();
    println!(
        "  {} messages consumed by {} consumers\n",
        consumed.get(),
        CONSUMERS
    );

    println!("Done!");
}
