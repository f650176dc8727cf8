//! GLFW window collaborator
//!
//! The renderer only needs a drawable surface, the current framebuffer size,
//! a close signal and resize notifications; everything else about windowing
//! stays behind this wrapper.

use glfw::{Glfw, GlfwReceiver, PWindow, WindowEvent, WindowMode};

/// Owned GLFW window plus its event receiver
pub struct WindowHandle {
    glfw: Glfw,
    window: PWindow,
    events: GlfwReceiver<(f64, WindowEvent)>,
}

impl WindowHandle {
    /// Create a window without a client API (Vulkan renders into it)
    pub fn new(width: u32, height: u32, title: &str) -> Self {
        let mut glfw = glfw::init(glfw::fail_on_errors).expect("failed to initialize GLFW");
        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(width, height, title, WindowMode::Windowed)
            .expect("failed to create GLFW window");
        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        Self {
            glfw,
            window,
            events,
        }
    }

    /// Process pending window events
    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
    }

    /// Block until an event arrives, then process it
    ///
    /// Used while minimized so the loop doesn't spin on a 0x0 framebuffer.
    pub fn wait_events(&mut self) {
        self.glfw.wait_events();
    }

    /// Iterate over events received since the last poll
    pub fn event_iter(&self) -> glfw::FlushedMessages<'_, (f64, WindowEvent)> {
        glfw::flush_messages(&self.events)
    }

    /// Whether the user has requested the window to close
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Programmatically request window closure
    pub fn set_should_close(&mut self, value: bool) {
        self.window.set_should_close(value);
    }

    /// Current drawable size in pixels
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    /// Whether the window is currently minimized (0x0 framebuffer)
    pub fn is_minimized(&self) -> bool {
        let (width, height) = self.window.get_framebuffer_size();
        width == 0 && height == 0
    }

    /// Instance extensions the window system requires for surface creation
    pub fn required_instance_extensions(&self) -> Vec<String> {
        self.glfw
            .get_required_instance_extensions()
            .unwrap_or_default()
    }

    /// Create a Vulkan surface for this window
    pub fn create_window_surface(
        &mut self,
        instance: ash::vk::Instance,
        surface: &mut ash::vk::SurfaceKHR,
    ) -> ash::vk::Result {
        self.window
            .create_window_surface(instance, std::ptr::null(), surface)
    }
}
